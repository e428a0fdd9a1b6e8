//! Checkpointing and Serialization.
//!
//! Exports any [`Module`]'s parameters as a flat state dict (names such as
//! `wq.weight` or `norm1.bias`, values flattened to rank 1) and persists state
//! dicts as `safetensors` files with `F32` elements.
//!
//! ```rust
//! use vit_rs::checkpoint::{load_state_dict, state_dict};
//! use vit_rs::nn::{LayerNorm, Module};
//!
//! let src = LayerNorm::<f32>::new(4, 1e-6);
//! let mut dst = LayerNorm::<f32>::new(4, 1e-6);
//! let dict = state_dict(&src).unwrap();
//! load_state_dict(&mut dst, &dict).unwrap();
//! assert_eq!(dst.num_parameters(), 8);
//! ```

use crate::nn::Module;
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Copies every parameter of `module` into a name → flattened tensor map.
pub fn state_dict<T, M>(module: &M) -> Result<HashMap<String, Tensor<T, 1, Cpu>>>
where
    T: TensorElem,
    M: Module<T> + ?Sized,
{
    let mut entries = Vec::new();
    module.visit_parameters("", &mut |p| entries.push((p.name, p.data.to_vec())));

    let mut dict = HashMap::with_capacity(entries.len());
    for (name, data) in entries {
        let len = data.len();
        dict.insert(name, Tensor::new(data, [len])?);
    }
    Ok(dict)
}

/// Overwrites the parameters of `module` from a state dict.
///
/// Every parameter must be present with the same element count. The dict is
/// checked completely before any parameter is written; extra entries are
/// ignored.
pub fn load_state_dict<T, M>(module: &mut M, dict: &HashMap<String, Tensor<T, 1, Cpu>>) -> Result<()>
where
    T: TensorElem,
    M: Module<T> + ?Sized,
{
    let mut problem: Option<TensorError> = None;
    module.visit_parameters("", &mut |p| {
        if problem.is_some() {
            return;
        }
        match dict.get(&p.name) {
            None => problem = Some(TensorError::MissingParameter(p.name)),
            Some(t) if t.size() != p.data.len() => {
                problem = Some(TensorError::ShapeMismatch {
                    expected: p.shape.to_vec(),
                    got: t.shape().to_vec(),
                })
            }
            Some(_) => {}
        }
    });
    if let Some(e) = problem {
        return Err(e);
    }

    module.visit_parameters_mut("", &mut |p| {
        if let Some(t) = dict.get(&p.name) {
            p.data.copy_from_slice(t.data());
        }
    });
    Ok(())
}

/// Saves a map of tensors to a safetensors file.
pub fn save_checkpoint<P: AsRef<Path>, T: TensorElem>(
    path: P,
    tensors: &HashMap<String, Tensor<T, 1, Cpu>>,
) -> Result<()> {
    let path = path.as_ref();

    // Little-endian bytes must outlive the views that borrow them.
    let mut buffers = Vec::with_capacity(tensors.len());
    for (name, tensor) in tensors {
        let mut bytes = Vec::with_capacity(tensor.size() * 4);
        for v in tensor.data() {
            let v = v.to_f32().ok_or_else(|| {
                TensorError::Serialization(format!("{}: value not representable as f32", name))
            })?;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        buffers.push((name.clone(), tensor.shape().to_vec(), bytes));
    }

    let mut views = HashMap::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| TensorError::Serialization(format!("{}: {:?}", name, e)))?;
        views.insert(name.clone(), view);
    }

    safetensors::serialize_to_file(&views, &None, path).map_err(|e| {
        TensorError::Serialization(format!("failed to save {}: {:?}", path.display(), e))
    })?;

    info!(path = %path.display(), tensors = views.len(), "saved checkpoint");
    Ok(())
}

/// Loads a map of tensors from a safetensors file.
///
/// Tensors are returned flattened; only `F32` entries are accepted.
pub fn load_checkpoint<P: AsRef<Path>, T: TensorElem>(
    path: P,
) -> Result<HashMap<String, Tensor<T, 1, Cpu>>> {
    let path = path.as_ref();
    let file_content = std::fs::read(path).map_err(|e| {
        TensorError::Serialization(format!("failed to read {}: {}", path.display(), e))
    })?;

    let safetensors = SafeTensors::deserialize(&file_content).map_err(|e| {
        TensorError::Serialization(format!("failed to deserialize {}: {:?}", path.display(), e))
    })?;

    let mut tensors = HashMap::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(TensorError::Serialization(format!(
                "{}: expected F32, found {:?}",
                name,
                view.dtype()
            )));
        }

        let data = view
            .data()
            .chunks_exact(4)
            .map(|b| {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                T::from_f32(v).ok_or_else(|| {
                    TensorError::Serialization(format!("{}: cannot represent {}", name, v))
                })
            })
            .collect::<Result<Vec<T>>>()?;

        debug!(name = %name, shape = ?view.shape(), "loaded tensor");
        let len = data.len();
        tensors.insert(name, Tensor::new(data, [len])?);
    }

    Ok(tensors)
}
