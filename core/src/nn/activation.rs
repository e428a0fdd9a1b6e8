//! Activation Functions.
//!
//! Activation functions introduce **non-linearity** into neural networks. Without them, a stack
//! of layers collapses into a single linear transformation.
//!
//! - **GELU**: Gaussian Error Linear Unit, the activation of the ViT feed-forward sub-block.
//! - **Softmax**: turns each row of attention scores into a probability distribution.

use crate::tensor::{Cpu, Tensor, TensorElem};
use num_traits::Float;
use rayon::prelude::*;

/// Activation functions namespace.
///
/// Provides tensor-level activation functions.
pub struct Activation;

impl Activation {
    /// Applies the GELU activation function element-wise to a tensor.
    pub fn gelu<const RANK: usize, T: TensorElem + Float>(
        x: &Tensor<T, RANK, Cpu>,
    ) -> Tensor<T, RANK, Cpu> {
        x.map(gelu)
    }

    /// Softmax over the innermost axis.
    ///
    /// Each row is shifted by its maximum before exponentiation, so large
    /// scores do not overflow.
    pub fn softmax<const RANK: usize, T: TensorElem + Float>(
        x: &Tensor<T, RANK, Cpu>,
    ) -> Tensor<T, RANK, Cpu> {
        let mut out = x.clone();
        Self::softmax_inplace(&mut out);
        out
    }

    /// In-place form of [`Activation::softmax`].
    pub fn softmax_inplace<const RANK: usize, T: TensorElem + Float>(x: &mut Tensor<T, RANK, Cpu>) {
        const { assert!(RANK >= 1, "softmax requires rank >= 1") };
        let s = x.shape()[RANK - 1];
        if s == 0 {
            return;
        }

        x.data_mut().par_chunks_mut(s).for_each(|row| {
            let mut max_val = row[0];
            for &v in row.iter() {
                if v > max_val {
                    max_val = v;
                }
            }

            let mut sum_exp = T::zero();
            for v in row.iter_mut() {
                *v = (*v - max_val).exp();
                sum_exp += *v;
            }

            let inv_sum = T::one() / sum_exp;
            for v in row.iter_mut() {
                *v *= inv_sum;
            }
        });
    }
}

/// Computes the GELU (Gaussian Error Linear Unit) activation function.
///
/// $$ \text{GELU}(x) \approx 0.5 x (1 + \tanh[\sqrt{2/\pi} (x + 0.044715 x^3)]) $$
///
/// This is the "tanh approximation" of GELU, which is faster to compute than the exact error function version.
/// It weights inputs by their magnitude, allowing small negative values to have a non-zero gradient (unlike ReLU).
pub fn gelu<T: TensorElem + Float>(x: T) -> T {
    let half = T::from_f64(0.5).unwrap_or_else(T::zero);
    let sqrt_2_over_pi = T::from_f64((2.0 / std::f64::consts::PI).sqrt()).unwrap_or_else(T::zero);
    let c = T::from_f64(0.044715).unwrap_or_else(T::zero);

    let inner = sqrt_2_over_pi * (x + c * x * x * x);
    half * x * (T::one() + inner.tanh())
}
