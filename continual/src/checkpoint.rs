//! Safetensors checkpointing of named f32 matrices.

use std::{collections::HashMap, fs, path::Path};

use ndarray::Array2;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::{Result, RunError};

/// Writes named matrices to a safetensors file.
///
/// # Errors
/// Returns `RunError::Checkpoint` if a tensor is not contiguous or the
/// encoding fails, `RunError::Io` on write failure.
pub fn save_tensors(path: &Path, tensors: &[(String, &Array2<f32>)]) -> Result<()> {
    let mut views = Vec::with_capacity(tensors.len());
    for (name, tensor) in tensors {
        let data = tensor.as_slice().ok_or_else(|| RunError::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("tensor '{name}' is not contiguous"),
        })?;
        let view = TensorView::new(
            Dtype::F32,
            tensor.shape().to_vec(),
            bytemuck::cast_slice(data),
        )
        .map_err(|e| RunError::Checkpoint {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        views.push((name.clone(), view));
    }

    let bytes = safetensors::serialize(views, &None).map_err(|e| RunError::Checkpoint {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    fs::write(path, bytes).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every matrix of a safetensors file.
///
/// # Errors
/// Returns `RunError::Io` on read failure and `RunError::Checkpoint`
/// on decode failure or a non-matrix/non-f32 tensor.
pub fn load_tensors(path: &Path) -> Result<HashMap<String, Array2<f32>>> {
    let bytes = fs::read(path).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let checkpoint_err = |reason: String| RunError::Checkpoint {
        path: path.to_path_buf(),
        reason,
    };

    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| checkpoint_err(e.to_string()))?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(checkpoint_err(format!(
                "tensor '{name}' has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        let shape = view.shape();
        if shape.len() != 2 {
            return Err(checkpoint_err(format!(
                "tensor '{name}' has {} dims, expected 2",
                shape.len()
            )));
        }

        let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        let array = Array2::from_shape_vec((shape[0], shape[1]), data)
            .map_err(|e| checkpoint_err(format!("tensor '{name}': {e}")))?;
        out.insert(name, array);
    }

    Ok(out)
}
