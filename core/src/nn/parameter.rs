//! Trainable parameters.
//!
//! A `Parameter` is a tensor owned by a layer plus a `requires_grad` flag. The
//! flag records whether an external optimizer should update the tensor; it does
//! not remove the parameter from traversal. Weights read from a pretrained
//! checkpoint are created frozen.

use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};

/// A tensor registered as a layer parameter.
#[derive(Debug, Clone)]
pub struct Parameter<T: TensorElem, const RANK: usize> {
    value: Tensor<T, RANK, Cpu>,
    requires_grad: bool,
}

impl<T: TensorElem, const RANK: usize> Parameter<T, RANK> {
    /// Wraps a tensor as a trainable parameter.
    pub fn new(value: Tensor<T, RANK, Cpu>) -> Self {
        Self {
            value,
            requires_grad: true,
        }
    }

    /// Wraps a tensor as a parameter that gradient tracking should skip.
    pub fn frozen(value: Tensor<T, RANK, Cpu>) -> Self {
        Self {
            value,
            requires_grad: false,
        }
    }

    pub fn value(&self) -> &Tensor<T, RANK, Cpu> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Tensor<T, RANK, Cpu> {
        &mut self.value
    }

    pub fn shape(&self) -> &[usize; RANK] {
        self.value.shape()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Overwrites the parameter data from a flat slice of the same length.
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        let dst = self.value.data_mut();
        if dst.len() != src.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![dst.len()],
                got: vec![src.len()],
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Read-only view of this parameter under a fully qualified name.
    pub fn view(&self, name: String) -> ParamView<'_, T> {
        ParamView {
            name,
            shape: self.value.shape(),
            data: self.value.data(),
            requires_grad: self.requires_grad,
        }
    }

    /// Mutable view of this parameter under a fully qualified name.
    pub fn view_mut(&mut self, name: String) -> ParamViewMut<'_, T> {
        let requires_grad = self.requires_grad;
        let shape = *self.value.shape();
        ParamViewMut {
            name,
            shape: shape.to_vec(),
            data: self.value.data_mut(),
            requires_grad,
        }
    }
}

/// A parameter as seen through `Module::visit_parameters`.
///
/// Rank is erased so parameters of different ranks can flow through one visitor.
#[derive(Debug)]
pub struct ParamView<'a, T> {
    pub name: String,
    pub shape: &'a [usize],
    pub data: &'a [T],
    pub requires_grad: bool,
}

/// A parameter as seen through `Module::visit_parameters_mut`.
#[derive(Debug)]
pub struct ParamViewMut<'a, T> {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: &'a mut [T],
    pub requires_grad: bool,
}
