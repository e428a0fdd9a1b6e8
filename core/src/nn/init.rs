//! Parameter initialization.

use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Lower and upper cut-off of [`trunc_normal`], in absolute units.
pub const TRUNC_NORMAL_BOUNDS: (f64, f64) = (-2.0, 2.0);

/// Draws allowed per element before [`trunc_normal`] gives up.
const MAX_DRAWS_PER_ELEMENT: usize = 1000;

/// Samples a tensor from `N(0, std²)` truncated to [`TRUNC_NORMAL_BOUNDS`].
///
/// Out-of-range draws are rejected and redrawn. With the usual `std = 0.02`
/// the bounds sit a hundred standard deviations out, so in practice this is a
/// plain normal; the truncation only matters for large `std`.
///
/// # Errors
///
/// `TensorError::Unsupported` if `std` is not a valid standard deviation, or
/// if an element is still out of range after `MAX_DRAWS_PER_ELEMENT` draws
/// (a `std` so large that almost no mass falls inside the bounds).
pub fn trunc_normal<T, R, const RANK: usize>(
    shape: [usize; RANK],
    std: f64,
    rng: &mut R,
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: TensorElem + Float,
    R: Rng + ?Sized,
{
    let normal = Normal::new(0.0, std)
        .map_err(|e| TensorError::Unsupported(format!("invalid init std {}: {}", std, e)))?;
    let (lo, hi) = TRUNC_NORMAL_BOUNDS;

    let size: usize = shape.iter().product();
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        let v = (0..MAX_DRAWS_PER_ELEMENT)
            .map(|_| normal.sample(rng))
            .find(|v: &f64| (lo..=hi).contains(v))
            .ok_or_else(|| {
                TensorError::Unsupported(format!(
                    "init std {} leaves no usable mass inside [{}, {}]",
                    std, lo, hi
                ))
            })?;
        data.push(T::from_f64(v).unwrap_or_else(T::zero));
    }
    Tensor::new(data, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_trunc_normal_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let t: Tensor<f32, 2> = trunc_normal([64, 64], 0.02, &mut rng).unwrap();
        assert_eq!(t.shape(), &[64, 64]);

        let n = t.size() as f32;
        let mean = t.data().iter().sum::<f32>() / n;
        let var = t.data().iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        assert!(mean.abs() < 2e-3);
        assert!((var.sqrt() - 0.02).abs() < 2e-3);
    }

    #[test]
    fn test_trunc_normal_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let t: Tensor<f32, 1> = trunc_normal([4096], 1.5, &mut rng).unwrap();
        assert!(t.data().iter().all(|v| (-2.0..=2.0).contains(v)));
    }

    #[test]
    fn test_trunc_normal_is_seeded() {
        let a: Tensor<f32, 1> = trunc_normal([16], 0.02, &mut StdRng::seed_from_u64(3)).unwrap();
        let b: Tensor<f32, 1> = trunc_normal([16], 0.02, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_trunc_normal_huge_std_fails_fast() {
        let mut rng = StdRng::seed_from_u64(5);
        let res: Result<Tensor<f32, 2>> = trunc_normal([4, 4], 1e7, &mut rng);
        assert!(matches!(res, Err(TensorError::Unsupported(_))));

        // Wide but usable: roughly one draw in six lands inside the bounds.
        let t: Tensor<f32, 1> = trunc_normal([256], 10.0, &mut rng).unwrap();
        assert!(t.data().iter().all(|v| (-2.0..=2.0).contains(v)));
    }

    #[test]
    fn test_trunc_normal_rejects_bad_std() {
        let mut rng = StdRng::seed_from_u64(0);
        let res: Result<Tensor<f32, 1>> = trunc_normal([4], -1.0, &mut rng);
        assert!(matches!(res, Err(TensorError::Unsupported(_))));
    }
}
