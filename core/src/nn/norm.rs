use crate::nn::module::{join_name, Module};
use crate::nn::parameter::{ParamView, ParamViewMut, Parameter};
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rayon::prelude::*;

/// Layer Normalization.
///
/// Normalizes each feature vector (the last dimension) to zero mean and unit
/// variance, then applies a learned scale and shift.
/// Formula: `y = (x - mean) / sqrt(var + eps) * gamma + beta`
///
/// The variance is the biased (population) estimate, divided by the feature
/// count rather than by `n - 1`.
#[derive(Debug, Clone)]
pub struct LayerNorm<T: TensorElem> {
    pub weight: Parameter<T, 1>,
    pub bias: Parameter<T, 1>,
    pub eps: T,
}

impl<T: TensorElem + Float> LayerNorm<T> {
    /// Creates a trainable LayerNorm over `dim` features with `gamma = 1` and
    /// `beta = 0`.
    pub fn new(dim: usize, eps: T) -> Self {
        Self {
            weight: Parameter::new(Tensor::ones([dim])),
            bias: Parameter::new(Tensor::zeros([dim])),
            eps,
        }
    }

    /// Creates a LayerNorm from existing parameters.
    ///
    /// # Errors
    ///
    /// `TensorError::ShapeMismatch` if `weight` and `bias` differ in length.
    pub fn from_params(weight: Parameter<T, 1>, bias: Parameter<T, 1>, eps: T) -> Result<Self> {
        if weight.shape() != bias.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: weight.shape().to_vec(),
                got: bias.shape().to_vec(),
            });
        }
        Ok(Self { weight, bias, eps })
    }

    pub fn dim(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Replaces gamma and beta, keeping the current feature count.
    pub fn set_params(&mut self, weight: Parameter<T, 1>, bias: Parameter<T, 1>) -> Result<()> {
        let dim = self.dim();
        if weight.shape()[0] != dim || bias.shape()[0] != dim {
            return Err(TensorError::ShapeMismatch {
                expected: vec![dim, dim],
                got: vec![weight.shape()[0], bias.shape()[0]],
            });
        }
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }

    /// Performs the forward pass of LayerNorm.
    ///
    /// Normalizes the input over the last dimension.
    pub fn forward<const RANK: usize>(
        &self,
        x: &Tensor<T, RANK, Cpu>,
    ) -> Result<Tensor<T, RANK, Cpu>> {
        const { assert!(RANK >= 1, "LayerNorm requires rank >= 1") };

        let shape = x.shape();
        let last_dim = shape[RANK - 1];
        if last_dim != self.dim() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.dim()],
                got: vec![last_dim],
            });
        }

        let mut out = Tensor::zeros(*shape);
        if last_dim == 0 || x.size() == 0 {
            return Ok(out);
        }

        let n = T::from_usize(last_dim).unwrap_or_else(T::one);
        let gamma = self.weight.value().data();
        let beta = self.bias.value().data();
        let eps = self.eps;

        out.data_mut()
            .par_chunks_mut(last_dim)
            .zip(x.data().par_chunks(last_dim))
            .for_each(|(out_row, in_row)| {
                let mut sum = T::zero();
                for &val in in_row {
                    sum += val;
                }
                let mean = sum / n;

                let mut sum_sq_diff = T::zero();
                for &val in in_row {
                    let diff = val - mean;
                    sum_sq_diff += diff * diff;
                }
                let var = sum_sq_diff / n;
                let rstd = T::one() / (var + eps).sqrt();

                for i in 0..last_dim {
                    out_row[i] = (in_row[i] - mean) * rstd * gamma[i] + beta[i];
                }
            });

        Ok(out)
    }
}

impl<T: TensorElem> Module<T> for LayerNorm<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(ParamView<'_, T>)) {
        f(self.weight.view(join_name(prefix, "weight")));
        f(self.bias.view(join_name(prefix, "bias")));
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(ParamViewMut<'_, T>)) {
        f(self.weight.view_mut(join_name(prefix, "weight")));
        f(self.bias.view_mut(join_name(prefix, "bias")));
    }
}
