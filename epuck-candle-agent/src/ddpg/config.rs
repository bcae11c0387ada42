//! Configuration of DDPG agent.
use super::{ActorConfig, CriticConfig};
use crate::Device;
use anyhow::Result;
use epuck_core::error::DdpgError;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ddpg`](super::Ddpg).
///
/// `Q` and `P` are the model configurations of the critic and the actor.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DdpgConfig<Q, P> {
    /// Configuration of the actor.
    pub actor_config: ActorConfig<P>,

    /// Configuration of the critic.
    pub critic_config: CriticConfig<Q>,

    /// Discount factor.
    pub gamma: f64,

    /// Weight of the old target parameters in the soft update.
    pub polyak: f64,

    /// Batch size for training.
    pub batch_size: usize,

    /// Number of parameter updates per call of [`Ddpg::train_step`](super::Ddpg::train_step).
    pub n_updates_per_opt: usize,

    /// Training is skipped while the buffer holds fewer transitions.
    pub min_transitions_warmup: usize,

    /// Standard deviation of the Gaussian exploration noise.
    pub noise_scale: f64,

    /// Device for the actor and critic models.
    pub device: Option<Device>,
}

impl<Q, P> Default for DdpgConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            polyak: 0.995,
            batch_size: 32,
            n_updates_per_opt: 1,
            min_transitions_warmup: 0,
            noise_scale: 0.1,
            device: None,
        }
    }
}

impl<Q, P> DdpgConfig<Q, P> {
    /// Configuration of actor.
    pub fn actor_config(mut self, v: ActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Polyak coefficient of the target update.
    pub fn polyak(mut self, v: f64) -> Self {
        self.polyak = v;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the numper of parameter update steps per optimization step.
    pub fn n_updates_per_opt(mut self, v: usize) -> Self {
        self.n_updates_per_opt = v;
        self
    }

    /// Interval before starting optimization.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Default exploration noise.
    pub fn noise_scale(mut self, v: f64) -> Self {
        self.noise_scale = v;
        self
    }

    /// Device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Checks that the hyperparameters are in their admissible ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(DdpgError::InvalidConfig(msg).into()) };

        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.polyak) {
            return invalid(format!("polyak must be in [0, 1], got {}", self.polyak));
        }
        if self.n_updates_per_opt == 0 {
            return invalid("n_updates_per_opt must be positive".to_string());
        }
        if !(self.noise_scale.is_finite() && self.noise_scale >= 0.0) {
            return Err(DdpgError::InvalidNoiseScale(self.noise_scale).into());
        }
        Ok(())
    }
}

impl<Q, P> DdpgConfig<Q, P>
where
    Q: Serialize + for<'de> Deserialize<'de>,
    P: Serialize + for<'de> Deserialize<'de>,
{
    /// Constructs [`DdpgConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of DDPG agent from {}", path_.to_str().unwrap_or("?"));
        Ok(b)
    }

    /// Saves [`DdpgConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of DDPG agent into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}
