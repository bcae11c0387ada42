use anyhow::{anyhow, Result};
use candle_core::Tensor;
use candle_nn::VarMap;
use std::collections::HashMap;

/// Snapshot of the parameters of a model.
///
/// Tensors are deep copies, so later updates of the model do not change the
/// snapshot.
pub struct NamedTensors {
    pub named_tensors: HashMap<String, Tensor>,
}

impl NamedTensors {
    /// Copies the data of [`VarMap`].
    pub fn copy_from(vs: &VarMap) -> Result<Self> {
        let src = vs
            .data()
            .lock()
            .map_err(|_| anyhow!("VarMap lock is poisoned"))?;
        let named_tensors = src
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.as_tensor().copy()?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { named_tensors })
    }

    /// Returns the tensor of the given name.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.named_tensors.get(name)
    }

    /// Maximum absolute elementwise difference to another snapshot of the same model.
    pub fn max_abs_diff(&self, other: &NamedTensors) -> Result<f32> {
        let mut max = 0f32;
        for (k, t) in self.named_tensors.iter() {
            let t_other = other
                .get(k)
                .ok_or_else(|| anyhow!("{} is not in the other snapshot", k))?;
            let d = (t - t_other)?
                .abs()?
                .flatten_all()?
                .max(0)?
                .to_scalar::<f32>()?;
            max = max.max(d);
        }
        Ok(max)
    }
}
