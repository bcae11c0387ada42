//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;
use epuck_core::{
    error::DdpgError,
    record::{Record, RecordValue},
};
use log::trace;
use std::collections::HashMap;
mod named_tensors;
pub use named_tensors::NamedTensors;

/// Interface for handling input dimensions.
pub trait InDim {
    /// Returns the input dimension.
    fn get_in_dim(&self) -> usize;
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: usize);
}

fn lock(varmap: &VarMap) -> Result<std::sync::MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))
}

/// Pairs up the variables of `dest` and `src` by name.
///
/// Both maps must hold the same names with the same shapes.
fn paired<'a>(
    dest: &'a HashMap<String, Var>,
    src: &'a HashMap<String, Var>,
) -> Result<Vec<(&'a String, &'a Var, &'a Var)>> {
    if dest.len() != src.len() {
        return Err(DdpgError::ParameterMismatch(format!(
            "{} variables in target, {} in source",
            dest.len(),
            src.len()
        ))
        .into());
    }

    dest.iter()
        .map(|(k, v_dest)| {
            let v_src = src
                .get(k)
                .ok_or_else(|| DdpgError::ParameterMismatch(format!("{} is missing", k)))?;
            if v_src.dims() != v_dest.dims() {
                return Err(DdpgError::ParameterMismatch(format!(
                    "{}: {:?} vs {:?}",
                    k,
                    v_dest.dims(),
                    v_src.dims()
                ))
                .into());
            }
            Ok((k, v_dest, v_src))
        })
        .collect()
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("dest");
    let dest = lock(dest)?;
    trace!("src");
    let src = lock(src)?;

    for (_, v_dest, v_src) in paired(&dest, &src)? {
        let t_src = v_src.as_tensor();
        let t_dest = v_dest.as_tensor();
        let t_dest = ((tau * t_src)? + ((1.0 - tau) * t_dest)?)?;
        v_dest.set(&t_dest)?;
    }

    Ok(())
}

/// Copies the values of all variables of `src` into `dest`.
pub fn copy_varmap(dest: &VarMap, src: &VarMap) -> Result<()> {
    let dest = lock(dest)?;
    let src = lock(src)?;

    for (_, v_dest, v_src) in paired(&dest, &src)? {
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Returns the standard deviation of a tensor.
pub fn std(t: &Tensor) -> Result<f32> {
    Ok(t.broadcast_sub(&t.mean_all()?)?
        .powf(2f64)?
        .mean_all()?
        .sqrt()?
        .to_vec0::<f32>()?)
}

/// Returns the mean and standard deviation of the parameters.
///
/// Keys are `{prefix}.{name}_mean` and `{prefix}.{name}_std`.
pub fn param_stats(varmap: &VarMap, prefix: &str) -> Result<Record> {
    let mut record = Record::empty();

    for (k, v) in lock(varmap)?.iter() {
        let m: f32 = v.mean_all()?.to_vec0()?;
        record.insert(format!("{}.{}_mean", prefix, k), RecordValue::Scalar(m));

        let s: f32 = std(v.as_tensor())?;
        record.insert(format!("{}.{}_std", prefix, k), RecordValue::Scalar(s));
    }

    Ok(record)
}

/// Returns `gamma * (1 - is_done)` for each row of a batch.
pub fn gamma_not_done(gamma: f64, is_done: &[i8], device: &Device) -> Result<Tensor> {
    let batch_size = is_done.len();
    let v = is_done
        .iter()
        .map(|d| (gamma * (1.0 - *d as f64)) as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&v[..], (batch_size,), device)?)
}

/// Converts a scalar loss to `f32`, failing with
/// [`DdpgError::DivergedTraining`] if it is NaN or infinite.
pub fn finite_loss(name: &str, loss: &Tensor) -> Result<f32> {
    let value = loss.to_scalar::<f32>()?;
    match value.is_finite() {
        true => Ok(value),
        false => Err(DdpgError::DivergedTraining {
            loss: name.to_string(),
            value,
        }
        .into()),
    }
}

/// Builds a `(rows, dim)` tensor from a row-major slice.
pub fn rows_to_tensor(v: &[f32], rows: usize, dim: usize, device: &Device) -> Result<Tensor> {
    if v.len() != rows * dim {
        return Err(DdpgError::shape_mismatch("rows", rows * dim, v.len()).into());
    }
    Ok(Tensor::from_slice(v, (rows, dim), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::Init;

    fn varmap_with(name: &str, v: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((v.len(),), name, init, DType::F32, &Device::Cpu)?;
        let t = Tensor::from_slice(v, (v.len(),), &Device::Cpu)?;
        lock(&vm)?
            .get(name)
            .ok_or_else(|| anyhow!("no var"))?
            .set(&t)?;
        Ok(vm)
    }

    fn values(vm: &VarMap, name: &str) -> Result<Vec<f32>> {
        Ok(lock(vm)?
            .get(name)
            .ok_or_else(|| anyhow!("no var"))?
            .as_tensor()
            .to_vec1::<f32>()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let vm_src = varmap_with("var1", &[1.0, 2.0, 3.0])?;
        let vm_dest = varmap_with("var1", &[4.0, 5.0, 6.0])?;
        track(&vm_dest, &vm_src, tau)?;

        let expected = [1.0f32, 2.0, 3.0]
            .iter()
            .zip([4.0f32, 5.0, 6.0].iter())
            .map(|(s, d)| tau as f32 * s + (1.0 - tau as f32) * d)
            .collect::<Vec<_>>();
        for (a, b) in values(&vm_dest, "var1")?.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        // Source is untouched.
        assert_eq!(values(&vm_src, "var1")?, vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_copy_varmap_is_exact_and_independent() -> Result<()> {
        let vm_src = varmap_with("w", &[0.1, -0.2])?;
        let vm_dest = varmap_with("w", &[9.0, 9.0])?;
        copy_varmap(&vm_dest, &vm_src)?;
        assert_eq!(values(&vm_dest, "w")?, vec![0.1, -0.2]);

        // Later changes of the source do not leak into the copy.
        let t = Tensor::from_slice(&[5.0f32, 5.0], (2,), &Device::Cpu)?;
        lock(&vm_src)?.get("w").unwrap().set(&t)?;
        assert_eq!(values(&vm_dest, "w")?, vec![0.1, -0.2]);
        Ok(())
    }

    #[test]
    fn test_track_rejects_mismatched_names() -> Result<()> {
        let vm_src = varmap_with("a", &[1.0])?;
        let vm_dest = varmap_with("b", &[1.0])?;
        let err = track(&vm_dest, &vm_src, 0.5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DdpgError>(),
            Some(DdpgError::ParameterMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_gamma_not_done() -> Result<()> {
        let t = gamma_not_done(0.99, &[0, 1, 0], &Device::Cpu)?;
        assert_eq!(t.to_vec1::<f32>()?, vec![0.99, 0.0, 0.99]);
        Ok(())
    }

    #[test]
    fn test_finite_loss() -> Result<()> {
        let ok = Tensor::new(0.5f32, &Device::Cpu)?;
        assert_eq!(finite_loss("critic", &ok)?, 0.5);

        let nan = Tensor::new(f32::NAN, &Device::Cpu)?;
        let err = finite_loss("critic", &nan).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DdpgError>(),
            Some(DdpgError::DivergedTraining { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_param_stats() -> Result<()> {
        let vm = varmap_with("w", &[1.0, 3.0])?;
        let record = param_stats(&vm, "actor")?;
        assert_eq!(record.get_scalar("actor.w_mean")?, 2.0);
        assert_eq!(record.get_scalar("actor.w_std")?, 1.0);
        Ok(())
    }
}
