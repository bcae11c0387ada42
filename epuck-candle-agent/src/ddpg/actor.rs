//! Actor of DDPG agent.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::{copy_varmap, InDim, OutDim},
};
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use epuck_core::error::DdpgError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Actor`].
pub struct ActorConfig<P> {
    pi_config: Option<P>,
    opt_config: OptimizerConfig,
    act_limit: f64,
}

impl<P> Default for ActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::default(),
            act_limit: 1.0,
        }
    }
}

impl<P> ActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations for the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: usize) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the bound of the action; actions lie in `[-v, v]`.
    pub fn act_limit(mut self, v: f64) -> Self {
        self.act_limit = v;
        self
    }
}

/// Deterministic policy of DDPG agents.
///
/// The output of the underlying model is squashed by `tanh` and scaled by
/// `act_limit`, so every action lies in `[-act_limit, act_limit]`.
pub struct Actor<P>
where
    P: SubModel1,
{
    device: Device,
    varmap: VarMap,

    // Dimensions of the state and the action.
    in_dim: usize,
    out_dim: usize,
    act_limit: f64,

    pi_config: P::Config,
    pi: P,

    // `None` for target copies.
    opt: Option<Optimizer>,
}

impl<P> Actor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + InDim + OutDim + Clone,
{
    /// Constructs [`Actor`].
    pub fn build(config: ActorConfig<P::Config>, device: Device) -> Result<Actor<P>> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        if !(config.act_limit.is_finite() && config.act_limit > 0.0) {
            return Err(DdpgError::InvalidConfig(format!(
                "act_limit must be positive, got {}",
                config.act_limit
            ))
            .into());
        }

        let mut actor = Self::_build(device, config.act_limit, pi_config)?;
        actor.opt = Some(config.opt_config.build(actor.varmap.all_vars())?);
        Ok(actor)
    }

    fn _build(device: Device, act_limit: f64, pi_config: P::Config) -> Result<Self> {
        let varmap = VarMap::new();
        let pi = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            P::build(vb, pi_config.clone())?
        };

        Ok(Self {
            device,
            varmap,
            in_dim: pi_config.get_in_dim(),
            out_dim: pi_config.get_out_dim(),
            act_limit,
            pi_config,
            pi,
            opt: None,
        })
    }

    /// Returns an actor with the same architecture and a copy of the parameters,
    /// for use as a target network.
    ///
    /// The copy owns its variables, so it does not share storage with `self`.
    /// It has no optimizer and [`Actor::backward_step`] fails on it.
    pub fn target_copy(&self) -> Result<Self> {
        let actor = Self::_build(self.device.clone(), self.act_limit, self.pi_config.clone())?;
        copy_varmap(&actor.varmap, &self.varmap)?;
        Ok(actor)
    }

    /// Outputs actions for a batch of states of shape `(batch, in_dim)`.
    pub fn forward(&self, state: &Tensor) -> Result<Tensor> {
        let dims = state.dims();
        if dims.len() != 2 || dims[1] != self.in_dim {
            return Err(
                DdpgError::shape_mismatch("actor input", ("batch", self.in_dim), dims).into(),
            );
        }

        let a = self.pi.forward(state)?;
        debug_assert_eq!(a.dims()[1], self.out_dim);
        Ok((a.tanh()? * self.act_limit)?)
    }

    /// Applies one optimizer step to the parameters of the actor.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match &mut self.opt {
            Some(opt) => opt.backward_step(loss),
            None => Err(anyhow!("Actor has no optimizer")),
        }
    }

    /// Variables of the actor.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Dimension of states.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Dimension of actions.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Bound of the actions.
    pub fn act_limit(&self) -> f64 {
        self.act_limit
    }
}
