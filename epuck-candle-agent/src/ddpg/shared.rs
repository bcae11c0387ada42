//! Thread-safe handle to a [`Ddpg`] agent.
use super::{Ddpg, TrainStats};
use crate::{
    model::{SubModel1, SubModel2},
    util::{InDim, OutDim},
};
use anyhow::{anyhow, Result};
use candle_core::Tensor;
use epuck_core::{ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Agent shared between the controller loop and the trainer.
///
/// Updates take the write lock for the whole critic, actor and target
/// update; action selection takes the read lock. A reader therefore sees
/// either all parameters before an update or all of them after it.
pub struct SharedDdpg<Q, P>
where
    Q: SubModel2,
    P: SubModel1,
{
    inner: Arc<RwLock<Ddpg<Q, P>>>,
}

impl<Q, P> Clone for SharedDdpg<Q, P>
where
    Q: SubModel2,
    P: SubModel1,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Q, P> SharedDdpg<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    /// Wraps an agent.
    pub fn new(agent: Ddpg<Q, P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(agent)),
        }
    }

    /// Shared access to the agent.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Ddpg<Q, P>>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("Agent lock is poisoned"))
    }

    /// Exclusive access to the agent.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Ddpg<Q, P>>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("Agent lock is poisoned"))
    }

    /// See [`Ddpg::select_action`].
    pub fn select_action(&self, state: &[f32], noise_scale: f64) -> Result<Vec<f32>> {
        self.read()?.select_action(state, noise_scale)
    }

    /// See [`Ddpg::act`].
    pub fn act(&self, state: &[f32]) -> Result<Vec<f32>> {
        self.read()?.act(state)
    }

    /// See [`Ddpg::one_step_update`].
    pub fn one_step_update(&self, batch: &TransitionBatch) -> Result<TrainStats> {
        self.write()?.one_step_update(batch)
    }

    /// See [`Ddpg::train_step`].
    pub fn train_step<R>(&self, buffer: &mut R) -> Result<Option<TrainStats>>
    where
        R: ReplayBufferBase<Batch = TransitionBatch> + ExperienceBufferBase,
    {
        self.write()?.train_step(buffer)
    }

    /// Number of parameter updates applied so far.
    pub fn n_opts(&self) -> Result<usize> {
        Ok(self.read()?.n_opts())
    }
}
