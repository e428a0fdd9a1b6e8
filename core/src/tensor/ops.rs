//! Tensor operations.
//!
//! - **Element-wise arithmetic**: `+`, `-`, `*`, `/` on `&Tensor` with strict
//!   shape checking (no implicit broadcasting).
//! - **Matrix multiplication**: plain and batched matmul, plus `matmul_nt`
//!   which multiplies by the transpose of the right-hand side.
//! - **Layout**: `transpose` of the last two axes and `transpose_axes` for an
//!   arbitrary pair of axes, both producing contiguous output.
//!
//! Element-wise work is parallelized with `rayon`.
//!
//! ```rust
//! use vit_rs::tensor::Tensor;
//!
//! let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
//! let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();
//!
//! let c = (&a + &b).unwrap();
//! assert_eq!(c.data(), &[4.0, 6.0]);
//! ```

use super::{Cpu, Device, Result, Tensor, TensorElem, TensorError};

use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary arithmetic operation trait (e.g., `Add`, `Sub`) for `&Tensor`.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK, Cpu>
        where
            T: TensorElem,
        {
            type Output = crate::tensor::Result<Tensor<T, RANK, Cpu>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Applies a function element-wise to the tensor.
    ///
    /// ```rust
    /// use vit_rs::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let squared = t.map(|x| x * x);
    /// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Applies a function element-wise in place.
    pub fn map_inplace<F>(&mut self, f: F)
    where
        F: Fn(T) -> T + Sync + Send,
    {
        self.data.par_iter_mut().for_each(|v| *v = f(*v));
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|v| v * factor)
    }

    /// Batched matrix multiplication over the last two dimensions:
    /// `[..., M, K] x [..., K, N] -> [..., M, N]`.
    ///
    /// Leading dimensions are batch dimensions and must match exactly.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        const { assert!(RANK >= 2, "Matmul requires rank >= 2") };
        let out_data = vit_rs_kernels::cpu_matmul(&self.data, &rhs.data, &self.shape, &rhs.shape)?;
        self.matmul_output(out_data, rhs.shape[RANK - 1])
    }

    /// Batched matrix multiplication against the transpose of `rhs`:
    /// `[..., M, K] x [..., N, K]ᵀ -> [..., M, N]`.
    ///
    /// Used for `x · Wᵀ` with `[out, in]` weights and for attention scores
    /// `q · kᵀ`.
    pub fn matmul_nt(&self, rhs: &Self) -> Result<Self> {
        const { assert!(RANK >= 2, "Matmul requires rank >= 2") };
        let out_data =
            vit_rs_kernels::cpu_matmul_nt(&self.data, &rhs.data, &self.shape, &rhs.shape)?;
        self.matmul_output(out_data, rhs.shape[RANK - 2])
    }

    fn matmul_output(&self, data: Vec<T>, n: usize) -> Result<Self> {
        let mut out_shape = self.shape;
        out_shape[RANK - 1] = n;
        Tensor::new(data, out_shape)
    }

    /// Transposes the last two dimensions.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` for rank < 2.
    pub fn transpose(&self) -> Result<Self> {
        let out_data = Cpu::transpose(&self.data, &self.shape)?;
        let mut new_shape = self.shape;
        if RANK >= 2 {
            new_shape.swap(RANK - 1, RANK - 2);
        }
        Tensor::new(out_data, new_shape)
    }

    /// Swaps two axes, physically permuting the data so the result is contiguous.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `ax1` or `ax2` are out of bounds.
    pub fn transpose_axes(&self, ax1: usize, ax2: usize) -> Result<Self> {
        if ax1 >= RANK || ax2 >= RANK {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![ax1, ax2],
                shape: self.shape.to_vec(),
            });
        }
        if ax1 == ax2 {
            return Ok(self.clone());
        }

        let mut new_shape = self.shape;
        new_shape.swap(ax1, ax2);

        // Input stride that each output axis walks along.
        let mut mapped_strides = self.strides;
        mapped_strides.swap(ax1, ax2);

        let mut out = Tensor::zeros(new_shape);
        let last = new_shape[RANK - 1];
        if last == 0 || out.data.is_empty() {
            return Ok(out);
        }
        let last_stride = mapped_strides[RANK - 1];
        let in_data = &self.data;

        // Each chunk is one contiguous output row along the last axis.
        out.data
            .par_chunks_mut(last)
            .enumerate()
            .for_each(|(row, chunk)| {
                let mut rem = row;
                let mut base = 0;
                for axis in (0..RANK - 1).rev() {
                    let coord = rem % new_shape[axis];
                    rem /= new_shape[axis];
                    base += coord * mapped_strides[axis];
                }
                for (i, o) in chunk.iter_mut().enumerate() {
                    *o = in_data[base + i * last_stride];
                }
            });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        assert_eq!((&a + &b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!((&a - &b).unwrap().data(), &[-2.0, -2.0]);
        assert_eq!((&a * &b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!((&a / &b).unwrap().data(), &[1.0 / 3.0, 2.0 / 4.0]);

        let f = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert!(matches!(&a + &f, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a * &f, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_map_and_scale() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert_eq!(a.map(|x| x * 2.0).data(), &[2.0, 4.0, 6.0]);
        assert_eq!(a.scale(0.5).data(), &[0.5, 1.0, 1.5]);

        let mut b = a.clone();
        b.map_inplace(|x| x - 1.0);
        assert_eq!(b.data(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_matmul_2d() {
        let a = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let b = Tensor::<f32, 2>::new(vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0], [3, 2]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        // Row 0: 1*7 + 2*9 + 3*2 = 31, 1*8 + 2*1 + 3*3 = 19
        // Row 1: 4*7 + 5*9 + 6*2 = 85, 4*8 + 5*1 + 6*3 = 55
        assert_eq!(c.data(), &[31.0, 19.0, 85.0, 55.0]);
    }

    #[test]
    fn test_matmul_3d() {
        // Batch 1: I * I = I; Batch 2: 2I * 3I = 6I
        let a = Tensor::<f32, 3>::new(
            vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0],
            [2, 2, 2],
        )
        .unwrap();
        let b = Tensor::<f32, 3>::new(
            vec![1.0, 0.0, 0.0, 1.0, 3.0, 0.0, 0.0, 3.0],
            [2, 2, 2],
        )
        .unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2, 2]);
        assert_eq!(c.data(), &[1.0, 0.0, 0.0, 1.0, 6.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn test_matmul_nt() {
        // [1, 2] x [3, 2]ᵀ -> [1, 3]
        let a = Tensor::<f32, 2>::new(vec![1.0, 2.0], [1, 2]).unwrap();
        let b = Tensor::<f32, 2>::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3, 2]).unwrap();

        let c = a.matmul_nt(&b).unwrap();
        assert_eq!(c.shape(), &[1, 3]);
        assert_eq!(c.data(), &[1.0, 2.0, 3.0]);

        let expected = a.matmul(&b.transpose().unwrap()).unwrap();
        assert_eq!(c.data(), expected.data());
    }

    #[test]
    fn test_matmul_errors() {
        let a = Tensor::<f32, 2>::zeros([2, 3]);
        let b = Tensor::<f32, 2>::zeros([4, 2]);
        assert!(matches!(a.matmul(&b), Err(TensorError::ShapeMismatch { .. })));

        let a = Tensor::<f32, 3>::zeros([2, 2, 2]);
        let b = Tensor::<f32, 3>::zeros([3, 2, 2]);
        assert!(matches!(a.matmul(&b), Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(a.matmul_nt(&b), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let t_t = t.transpose().unwrap();
        assert_eq!(t_t.shape(), &[3, 2]);
        assert_eq!(t_t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let v = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        assert!(matches!(v.transpose(), Err(TensorError::Unsupported(_))));
    }

    #[test]
    fn test_transpose_axes_rank4() {
        // [B, S, H, D] -> [B, H, S, D]
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let t = Tensor::<f32, 4>::new(data, [1, 2, 2, 2]).unwrap();

        let permuted = t.transpose_axes(1, 2).unwrap();
        assert_eq!(permuted.shape(), &[1, 2, 2, 2]);
        assert_eq!(permuted.data(), &[0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_transpose_axes_rank3_outer() {
        // [2, 3, 1] -> swap axes 0 and 1 -> [3, 2, 1]
        let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let t = Tensor::<f32, 3>::new(data, [2, 3, 1]).unwrap();

        let p = t.transpose_axes(0, 1).unwrap();
        assert_eq!(p.shape(), &[3, 2, 1]);
        assert_eq!(p.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_transpose_axes_last_axis_matches_transpose() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let t = Tensor::<f32, 3>::new(data, [2, 3, 4]).unwrap();

        let a = t.transpose_axes(1, 2).unwrap();
        let b = t.transpose().unwrap();
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_transpose_axes_roundtrip() {
        let data: Vec<f32> = (0..60).map(|i| i as f32).collect();
        let t = Tensor::<f32, 4>::new(data.clone(), [2, 5, 3, 2]).unwrap();

        let back = t.transpose_axes(0, 2).unwrap().transpose_axes(0, 2).unwrap();
        assert_eq!(back.shape(), &[2, 5, 3, 2]);
        assert_eq!(back.data(), &data[..]);
    }

    #[test]
    fn test_transpose_axes_errors() {
        let t = Tensor::<f32, 2>::zeros([2, 2]);
        assert!(matches!(
            t.transpose_axes(0, 2),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
        assert_eq!(t.transpose_axes(1, 1).unwrap().shape(), &[2, 2]);
    }
}
