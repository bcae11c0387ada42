//! Ring replay buffer.
use super::SimpleReplayBufferConfig;
use crate::{
    error::DdpgError, ExperienceBufferBase, ReplayBufferBase, Transition, TransitionBatch,
};
use anyhow::Result;
use log::trace;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A replay buffer of fixed capacity.
///
/// Storage is allocated once at construction: one flat array per field,
/// indexed by slot. `i` is the write cursor and `size` the number of
/// occupied slots. While `size < capacity` the cursor equals `size`; after
/// that every push overwrites the slot at the cursor, which then advances
/// modulo `capacity`.
///
/// ```
/// use epuck_core::{
///     replay_buffer::{SimpleReplayBuffer, SimpleReplayBufferConfig},
///     ExperienceBufferBase, ReplayBufferBase, Transition,
/// };
///
/// let config = SimpleReplayBufferConfig::default().capacity(2).state_dim(1).act_dim(1);
/// let mut buffer = SimpleReplayBuffer::build(&config).unwrap();
/// buffer.push(Transition::new(vec![0.0], vec![0.1], 1.0, vec![1.0], false)).unwrap();
/// let batch = buffer.batch(8).unwrap();
/// assert_eq!(batch.len(), 8);
/// ```
pub struct SimpleReplayBuffer {
    capacity: usize,
    state_dim: usize,
    act_dim: usize,

    /// Write cursor.
    i: usize,

    /// Number of occupied slots.
    size: usize,

    state: Vec<f32>,
    action: Vec<f32>,
    reward: Vec<f32>,
    next_state: Vec<f32>,
    is_done: Vec<i8>,
    rng: StdRng,
}

impl SimpleReplayBuffer {
    /// Maximum number of transitions held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dimension of states.
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Dimension of actions.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Slot that the next push writes to.
    pub fn cursor(&self) -> usize {
        self.i
    }

    /// Returns a copy of the transition stored in slot `ix`.
    pub fn get(&self, ix: usize) -> Option<Transition> {
        if ix >= self.size {
            return None;
        }
        let (s, a) = (self.state_dim, self.act_dim);
        Some(Transition::new(
            self.state[ix * s..(ix + 1) * s].to_vec(),
            self.action[ix * a..(ix + 1) * a].to_vec(),
            self.reward[ix],
            self.next_state[ix * s..(ix + 1) * s].to_vec(),
            self.is_done[ix] != 0,
        ))
    }

    /// Returns the number of terminal transitions in the buffer.
    pub fn num_done_flags(&self) -> usize {
        self.is_done[..self.size]
            .iter()
            .map(|is_done| *is_done as usize)
            .sum()
    }

    /// Returns the sum of the rewards in the buffer.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }

    #[inline]
    fn write_slot(&mut self, ix: usize, tr: &Transition) {
        let (s, a) = (self.state_dim, self.act_dim);
        self.state[ix * s..(ix + 1) * s].copy_from_slice(tr.state());
        self.action[ix * a..(ix + 1) * a].copy_from_slice(tr.action());
        self.reward[ix] = tr.reward();
        self.next_state[ix * s..(ix + 1) * s].copy_from_slice(tr.next_state());
        self.is_done[ix] = tr.is_done() as i8;
    }

    fn sample_rows(&self, ixs: &[usize], src: &[f32], dim: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(ixs.len() * dim);
        for &ix in ixs.iter() {
            out.extend_from_slice(&src[ix * dim..(ix + 1) * dim]);
        }
        out
    }
}

impl ExperienceBufferBase for SimpleReplayBuffer {
    type Item = Transition;

    fn len(&self) -> usize {
        self.size
    }

    /// Writes the transition into the slot at the cursor.
    ///
    /// Fails only if the dimensions of the transition differ from the
    /// configured ones, in which case the buffer is left untouched.
    fn push(&mut self, tr: Transition) -> Result<()> {
        tr.check_dims(self.state_dim, self.act_dim)?;
        self.write_slot(self.i, &tr);

        self.i = (self.i + 1) % self.capacity;
        if self.size < self.capacity {
            self.size += 1;
        }

        Ok(())
    }
}

impl ReplayBufferBase for SimpleReplayBuffer {
    type Config = SimpleReplayBufferConfig;
    type Batch = TransitionBatch;

    fn build(config: &Self::Config) -> Result<Self> {
        if config.capacity == 0 {
            return Err(DdpgError::InvalidConfig("capacity must be positive".into()).into());
        }
        let capacity = config.capacity;
        let (s, a) = (config.state_dim, config.act_dim);

        Ok(Self {
            capacity,
            state_dim: s,
            act_dim: a,
            i: 0,
            size: 0,
            state: vec![0.; capacity * s],
            action: vec![0.; capacity * a],
            reward: vec![0.; capacity],
            next_state: vec![0.; capacity * s],
            is_done: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Samples `size` transitions uniformly at random with replacement.
    fn batch(&mut self, size: usize) -> Result<TransitionBatch> {
        if self.size == 0 {
            return Err(DdpgError::EmptyStore.into());
        }
        trace!("Sample {} transitions from {}", size, self.size);

        let n = self.size;
        let ixs = (0..size)
            .map(|_| self.rng.gen_range(0..n))
            .collect::<Vec<_>>();

        Ok(TransitionBatch {
            state_dim: self.state_dim,
            act_dim: self.act_dim,
            state: self.sample_rows(&ixs, &self.state, self.state_dim),
            action: self.sample_rows(&ixs, &self.action, self.act_dim),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            next_state: self.sample_rows(&ixs, &self.next_state, self.state_dim),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
            ix_sample: Some(ixs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn buffer(capacity: usize) -> Result<SimpleReplayBuffer> {
        let config = SimpleReplayBufferConfig::default()
            .capacity(capacity)
            .state_dim(1)
            .act_dim(1);
        SimpleReplayBuffer::build(&config)
    }

    /// Transition tagged by `id` in every field.
    fn tagged(id: usize) -> Transition {
        let x = id as f32;
        Transition::new(vec![x], vec![-x], x, vec![x + 0.5], id % 3 == 0)
    }

    #[test]
    fn test_len_never_exceeds_capacity() -> Result<()> {
        let capacity = 5;
        let mut buffer = buffer(capacity)?;
        assert!(buffer.is_empty());

        for n in 1..=3 * capacity {
            buffer.push(tagged(n))?;
            assert_eq!(buffer.len(), n.min(capacity));
        }
        Ok(())
    }

    #[test]
    fn test_overwrite_keeps_latest() -> Result<()> {
        let capacity = 8;
        let k = 5;
        let mut buffer = buffer(capacity)?;
        for id in 0..capacity + k {
            buffer.push(tagged(id))?;
        }

        let ids = (0..buffer.len())
            .map(|ix| buffer.get(ix).unwrap().state()[0] as usize)
            .collect::<HashSet<_>>();
        let expected = (k..capacity + k).collect::<HashSet<_>>();
        assert_eq!(buffer.len(), capacity);
        assert_eq!(ids, expected);
        Ok(())
    }

    #[test]
    fn test_ring_order_after_wrap() -> Result<()> {
        let mut buffer = buffer(4)?;
        for id in 0..5 {
            buffer.push(Transition::new(
                vec![id as f32],
                vec![0.0],
                0.0,
                vec![id as f32],
                false,
            ))?;
        }

        let states = (0..4)
            .map(|ix| buffer.get(ix).unwrap().state()[0])
            .collect::<Vec<_>>();
        assert_eq!(states, vec![4.0, 1.0, 2.0, 3.0]);
        assert_eq!(buffer.cursor(), 1);
        Ok(())
    }

    #[test]
    fn test_batch_with_replacement() -> Result<()> {
        let mut buffer = buffer(10)?;
        for id in 0..3 {
            buffer.push(tagged(id))?;
        }

        let batch = buffer.batch(32)?;
        assert_eq!(batch.len(), 32);
        assert_eq!(batch.states().len(), 32);
        assert_eq!(batch.ix_sample().unwrap().len(), 32);

        for i in 0..batch.len() {
            let id = batch.state(i)[0] as usize;
            assert!(id < 3);
            assert_eq!(batch.action(i), &[-(id as f32)]);
            assert_eq!(batch.rewards()[i], id as f32);
            assert_eq!(batch.next_state(i), &[id as f32 + 0.5]);
            assert_eq!(batch.is_done()[i], (id % 3 == 0) as i8);
        }
        Ok(())
    }

    #[test]
    fn test_batch_from_empty_buffer() -> Result<()> {
        let mut buffer = buffer(4)?;
        let err = buffer.batch(1).unwrap_err();
        assert_eq!(err.downcast_ref::<DdpgError>(), Some(&DdpgError::EmptyStore));
        Ok(())
    }

    #[test]
    fn test_push_rejects_wrong_dims() -> Result<()> {
        let mut buffer = buffer(4)?;
        buffer.push(tagged(1))?;
        let err = buffer
            .push(Transition::new(vec![0.0, 1.0], vec![0.0], 0.0, vec![0.0, 1.0], false))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DdpgError>(),
            Some(DdpgError::ShapeMismatch { .. })
        ));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.cursor(), 1);
        Ok(())
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(buffer(0).is_err());
    }

    #[test]
    fn test_diagnostics() -> Result<()> {
        let mut buffer = buffer(4)?;
        for id in 0..6 {
            buffer.push(tagged(id))?;
        }
        // Slots hold ids 4, 5, 2, 3.
        assert_eq!(buffer.num_done_flags(), 1);
        assert_eq!(buffer.sum_rewards(), 14.0);
        Ok(())
    }
}
