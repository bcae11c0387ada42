//! Critic of DDPG agent.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::{copy_varmap, InDim, OutDim},
};
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use epuck_core::error::DdpgError;
use log::trace;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::ops::Deref;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Critic`].
pub struct CriticConfig<Q> {
    q_config: Option<Q>,
    opt_config: OptimizerConfig,
}

impl<Q> Default for CriticConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<Q> CriticConfig<Q>
where
    Q: DeserializeOwned + Serialize,
{
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// Action-value function `Q(s, a)` of DDPG agents.
///
/// The input dimension of the model is the sum of the state and action
/// dimensions. The critic can be frozen with [`Critic::freeze`], which
/// blocks optimizer steps until the returned guard is dropped.
pub struct Critic<Q>
where
    Q: SubModel2,
{
    device: Device,
    varmap: VarMap,
    in_dim: usize,

    q_config: Q::Config,
    q: Q,

    // `None` for target copies.
    opt: Option<Optimizer>,

    trainable: bool,
}

impl<Q> Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    /// Constructs [`Critic`].
    ///
    /// The model has to output a single value per row.
    pub fn build(config: CriticConfig<Q::Config>, device: Device) -> Result<Critic<Q>> {
        let q_config = config.q_config.context("q_config is not set.")?;
        if q_config.get_out_dim() != 1 {
            return Err(
                DdpgError::shape_mismatch("critic output", 1, q_config.get_out_dim()).into(),
            );
        }

        let mut critic = Self::_build(device, q_config)?;
        critic.opt = Some(config.opt_config.build(critic.varmap.all_vars())?);
        Ok(critic)
    }

    fn _build(device: Device, q_config: Q::Config) -> Result<Self> {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, q_config.clone())?
        };

        Ok(Self {
            device,
            varmap,
            in_dim: q_config.get_in_dim(),
            q_config,
            q,
            opt: None,
            trainable: true,
        })
    }

    /// Returns a critic with the same architecture and a copy of the
    /// parameters, for use as a target network. The copy has no optimizer.
    pub fn target_copy(&self) -> Result<Self> {
        let critic = Self::_build(self.device.clone(), self.q_config.clone())?;
        copy_varmap(&critic.varmap, &self.varmap)?;
        Ok(critic)
    }

    /// Returns action values of shape `(batch,)`.
    pub fn forward(&self, state: &Tensor, action: &Tensor) -> Result<Tensor> {
        let (s, a) = (state.dims(), action.dims());
        if s.len() != 2 || a.len() != 2 || s[0] != a[0] {
            return Err(DdpgError::shape_mismatch(
                "critic input",
                "(batch, state_dim) and (batch, act_dim)",
                (s, a),
            )
            .into());
        }
        if s[1] + a[1] != self.in_dim {
            return Err(DdpgError::shape_mismatch(
                "critic input",
                self.in_dim,
                s[1] + a[1],
            )
            .into());
        }

        Ok(self.q.forward(state, action)?.squeeze(D::Minus1)?)
    }

    /// Applies one optimizer step to the parameters of the critic.
    ///
    /// Fails while the critic is frozen.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        if !self.trainable {
            return Err(anyhow!("Critic is frozen"));
        }
        match &mut self.opt {
            Some(opt) => opt.backward_step(loss),
            None => Err(anyhow!("Critic has no optimizer")),
        }
    }

    /// Marks the parameters as non-trainable until the guard is dropped.
    pub fn freeze(&mut self) -> FrozenCritic<'_, Q> {
        trace!("Freeze critic");
        self.trainable = false;
        FrozenCritic { critic: self }
    }

    /// Returns `false` while a [`FrozenCritic`] guard is alive.
    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    /// Variables of the critic.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Input dimension, the sum of state and action dimensions.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }
}

/// Read-only view of a frozen [`Critic`].
///
/// Gradients still flow through the critic's forward pass, but its
/// parameters cannot be stepped through this view. Dropping the guard makes
/// the critic trainable again, also on early returns.
pub struct FrozenCritic<'a, Q>
where
    Q: SubModel2,
{
    critic: &'a mut Critic<Q>,
}

impl<'a, Q> Deref for FrozenCritic<'a, Q>
where
    Q: SubModel2,
{
    type Target = Critic<Q>;

    fn deref(&self) -> &Critic<Q> {
        self.critic
    }
}

impl<'a, Q> Drop for FrozenCritic<'a, Q>
where
    Q: SubModel2,
{
    fn drop(&mut self) {
        trace!("Unfreeze critic");
        self.critic.trainable = true;
    }
}
