//! Thread-safe handle to a [`SimpleReplayBuffer`].
use super::{SimpleReplayBuffer, SimpleReplayBufferConfig};
use crate::{ExperienceBufferBase, ReplayBufferBase, Transition, TransitionBatch};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};

/// Replay buffer shared between the controller loop and the trainer.
///
/// Clones are handles to the same buffer. Every operation holds the lock for
/// its whole duration, so a sample never observes a half-written transition.
#[derive(Clone)]
pub struct SharedReplayBuffer {
    inner: Arc<Mutex<SimpleReplayBuffer>>,
}

impl SharedReplayBuffer {
    /// Wraps an existing buffer.
    pub fn new(buffer: SimpleReplayBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    /// Locks the buffer for a sequence of operations.
    pub fn lock(&self) -> Result<MutexGuard<'_, SimpleReplayBuffer>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Replay buffer lock is poisoned"))
    }

    /// Stores a transition built from its parts.
    pub fn add_transition(
        &self,
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) -> Result<()> {
        self.lock()?
            .push(Transition::new(state, action, reward, next_state, done))
    }

    /// Samples a batch through a shared reference.
    pub fn sample(&self, size: usize) -> Result<TransitionBatch> {
        self.lock()?.batch(size)
    }
}

impl ExperienceBufferBase for SharedReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Transition) -> Result<()> {
        self.lock()?.push(tr)
    }

    /// Returns `0` if the lock is poisoned; see [`ExperienceBufferBase::try_len`].
    fn len(&self) -> usize {
        self.try_len().unwrap_or(0)
    }

    fn try_len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

impl ReplayBufferBase for SharedReplayBuffer {
    type Config = SimpleReplayBufferConfig;
    type Batch = TransitionBatch;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self::new(SimpleReplayBuffer::build(config)?))
    }

    fn batch(&mut self, size: usize) -> Result<TransitionBatch> {
        self.sample(size)
    }
}
