//! Replay buffer interface.
//!
//! [`ExperienceBufferBase`] is the producer side used by the controller loop
//! and [`ReplayBufferBase`] is the consumer side used by the trainer. Both are
//! implemented by [`SimpleReplayBuffer`] and by the thread-safe handle
//! [`SharedReplayBuffer`].
//!
//! [`SimpleReplayBuffer`]: crate::replay_buffer::SimpleReplayBuffer
//! [`SharedReplayBuffer`]: crate::replay_buffer::SharedReplayBuffer
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// Items pushed into the buffer.
    type Item;

    /// Pushes an experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the number of experiences currently stored.
    fn len(&self) -> usize;

    /// Like [`ExperienceBufferBase::len`], but reports failures to read the
    /// buffer, such as a poisoned lock, instead of hiding them.
    fn try_len(&self) -> Result<usize> {
        Ok(self.len())
    }

    /// Returns `true` if the buffer holds no experience.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration of the replay buffer.
    type Config: Clone;

    /// Batch generated for training.
    type Batch;

    /// Builds a replay buffer from its configuration.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Samples a batch of `size` experiences.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
