//! Target networks of DDPG agent.
use super::{Actor, Critic};
use crate::{
    model::{SubModel1, SubModel2},
    util::{track, InDim, OutDim},
};
use anyhow::Result;
use candle_core::Tensor;
use epuck_core::error::DdpgError;
use log::trace;
use serde::{de::DeserializeOwned, Serialize};

/// Slowly-tracking copies of the actor and the critic.
///
/// Only forward evaluation is exposed; the parameters change exclusively
/// through [`TargetNetwork::sync_polyak`].
pub struct TargetNetwork<Q, P>
where
    Q: SubModel2,
    P: SubModel1,
{
    actor: Actor<P>,
    critic: Critic<Q>,
}

impl<Q, P> TargetNetwork<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    /// Creates target networks holding exact copies of the live parameters.
    pub fn from_live(actor: &Actor<P>, critic: &Critic<Q>) -> Result<Self> {
        Ok(Self {
            actor: actor.target_copy()?,
            critic: critic.target_copy()?,
        })
    }

    /// `θ_tgt ← (1 - tau) θ_tgt + tau θ_live` for every parameter.
    ///
    /// `tau` is `1 - polyak`.
    pub fn sync_polyak(&mut self, actor: &Actor<P>, critic: &Critic<Q>, tau: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&tau) {
            return Err(DdpgError::InvalidConfig(format!("tau must be in [0, 1], got {}", tau)).into());
        }
        trace!("Sync target networks with tau = {}", tau);
        track(self.critic.get_varmap(), critic.get_varmap(), tau)?;
        track(self.actor.get_varmap(), actor.get_varmap(), tau)?;
        Ok(())
    }

    /// `Q_tgt(s', π_tgt(s'))`, detached from the computation graph.
    pub fn next_q(&self, next_state: &Tensor) -> Result<Tensor> {
        let next_action = self.actor.forward(next_state)?;
        Ok(self.critic.forward(next_state, &next_action)?.detach())
    }

    /// Target actor.
    pub fn actor(&self) -> &Actor<P> {
        &self.actor
    }

    /// Target critic.
    pub fn critic(&self) -> &Critic<Q> {
        &self.critic
    }
}
