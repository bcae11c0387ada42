//! Optimizers of the actor and the critic.
use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Hyperparameters of [`AdamW`].
///
/// Fields missing in a config file fall back to [`ParamsAdamW::default`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        let p = ParamsAdamW::default();
        Self {
            lr: p.lr,
            beta1: p.beta1,
            beta2: p.beta2,
            eps: p.eps,
            weight_decay: p.weight_decay,
        }
    }
}

impl From<&AdamWConfig> for ParamsAdamW {
    fn from(c: &AdamWConfig) -> Self {
        ParamsAdamW {
            lr: c.lr,
            beta1: c.beta1,
            beta2: c.beta2,
            eps: c.eps,
            weight_decay: c.weight_decay,
        }
    }
}

/// Selects the optimizer of a network and its hyperparameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam with decoupled weight decay, from `candle-nn`.
    AdamW(AdamWConfig),

    /// Plain Adam, from `candle-optimisers`. Other hyperparameters take
    /// their library defaults.
    Adam { lr: f64 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::AdamW(AdamWConfig::default())
    }
}

impl OptimizerConfig {
    /// Constructs an optimizer over the given variables.
    ///
    /// Only these variables are touched by [`Optimizer::backward_step`].
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        let opt = match self {
            Self::AdamW(c) => Optimizer::AdamW(AdamW::new(vars, c.into())?),
            Self::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                Optimizer::Adam(Adam::new(vars, params)?)
            }
        };
        Ok(opt)
    }

    /// Learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::AdamW(c) => c.lr,
            Self::Adam { lr } => *lr,
        }
    }

    /// Overrides the learning rate, keeping the other hyperparameters.
    pub fn learning_rate(mut self, v: f64) -> Self {
        match &mut self {
            Self::AdamW(c) => c.lr = v,
            Self::Adam { lr } => *lr = v,
        }
        self
    }
}

/// An optimizer bound to the variables of one network.
pub enum Optimizer {
    AdamW(AdamW),
    Adam(Adam),
}

impl Optimizer {
    /// Computes gradients of `loss` and applies one step to the optimized variables.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::AdamW(opt) => opt.backward_step(loss)?,
            Self::Adam(opt) => opt.backward_step(loss)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_step_touches_only_own_vars() -> Result<()> {
        let x = Var::ones(2, DType::F32, &Device::Cpu)?;
        let y = Var::ones(2, DType::F32, &Device::Cpu)?;
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(vec![x.clone()])?;

        // The loss depends on both variables, so `y` receives a gradient too.
        let loss = (x.as_tensor() * y.as_tensor())?.sum_all()?;
        opt.backward_step(&loss)?;

        assert_eq!(y.as_tensor().to_vec1::<f32>()?, vec![1.0, 1.0]);
        assert!(x.as_tensor().to_vec1::<f32>()?.iter().all(|v| *v < 1.0));
        Ok(())
    }

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::default().learning_rate(1e-4);
        assert_eq!(config.lr(), 1e-4);
        match config {
            OptimizerConfig::AdamW(c) => {
                assert_eq!(c.beta1, ParamsAdamW::default().beta1);
                assert_eq!(c.weight_decay, ParamsAdamW::default().weight_decay);
            }
            _ => panic!("default optimizer is AdamW"),
        }
    }

    #[test]
    fn test_partial_adamw_config_from_yaml() -> Result<()> {
        let config: OptimizerConfig = serde_yaml::from_str("AdamW:\n  lr: 0.0003\n")?;
        assert_eq!(config.lr(), 3e-4);
        assert_eq!(
            config,
            OptimizerConfig::AdamW(AdamWConfig::default()).learning_rate(3e-4)
        );
        Ok(())
    }
}
