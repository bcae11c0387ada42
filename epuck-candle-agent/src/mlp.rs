//! Multilayer perceptron.
mod base;
mod config;
use anyhow::{anyhow, Result};
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{Linear, Module};
pub use config::MlpConfig;

/// ReLU after every layer except the last one.
fn mlp_forward(xs: Tensor, layers: &[Linear]) -> Result<Tensor> {
    let (last, hidden) = layers
        .split_last()
        .ok_or_else(|| anyhow!("MLP has no layers"))?;
    let xs = hidden
        .iter()
        .try_fold(xs, |xs, layer| layer.forward(&xs)?.relu())?;
    Ok(last.forward(&xs)?)
}
