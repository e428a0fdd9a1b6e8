//! Dropout and drop-path (stochastic depth).
//!
//! Both take the random source as an explicit argument so a seeded RNG gives
//! reproducible masks. Draws happen sequentially on the calling thread.

use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How drop-path rescales the elements it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPathScaling {
    /// Divide by the realized keep ratio `kept / batch` of the current batch.
    #[default]
    Empirical,
    /// Divide by the nominal keep probability `1 - p`.
    Nominal,
}

fn check_probability(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(TensorError::Unsupported(format!(
            "probability must be in [0, 1], got {}",
            p
        )));
    }
    Ok(())
}

/// Inverted dropout: zeroes each element with probability `p` and scales the
/// survivors by `1 / (1 - p)`.
///
/// `p == 0` returns the input unchanged without drawing from `rng`; `p == 1`
/// returns zeros.
pub fn dropout<T, R, const RANK: usize>(
    x: &Tensor<T, RANK, Cpu>,
    p: f64,
    rng: &mut R,
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: TensorElem + Float,
    R: Rng + ?Sized,
{
    check_probability(p)?;
    if p == 0.0 {
        return Ok(x.clone());
    }
    if p >= 1.0 {
        return Ok(Tensor::zeros(*x.shape()));
    }

    let scale = T::from_f64(1.0 / (1.0 - p)).unwrap_or_else(T::one);
    let mut out = x.clone();
    for v in out.data_mut() {
        if rng.random::<f64>() < p {
            *v = T::zero();
        } else {
            *v = *v * scale;
        }
    }
    Ok(out)
}

/// Drop-path over a `[batch, seq, features]` tensor.
///
/// In training mode each batch element is kept iff a uniform draw `u`
/// satisfies `u > p`; kept elements are rescaled according to `scaling` and
/// dropped ones become zero. Outside training mode the input is returned
/// unchanged and `rng` is untouched.
///
/// When no element survives the result is all zeros.
pub fn drop_path<T, R>(
    x: &Tensor<T, 3, Cpu>,
    p: f64,
    scaling: DropPathScaling,
    training: bool,
    rng: &mut R,
) -> Result<Tensor<T, 3, Cpu>>
where
    T: TensorElem + Float,
    R: Rng + ?Sized,
{
    check_probability(p)?;
    if !training {
        return Ok(x.clone());
    }

    let [batch, seq, features] = *x.shape();
    if batch == 0 {
        return Ok(x.clone());
    }

    let keep: Vec<bool> = (0..batch).map(|_| rng.random::<f64>() > p).collect();
    let kept = keep.iter().filter(|&&k| k).count();

    let factor = match scaling {
        DropPathScaling::Empirical => kept as f64 / batch as f64,
        DropPathScaling::Nominal => 1.0 - p,
    };
    if kept == 0 || factor <= 0.0 {
        warn!(batch, p, "drop_path dropped every batch element");
        return Ok(Tensor::zeros(*x.shape()));
    }
    let scale = T::from_f64(1.0 / factor).unwrap_or_else(T::one);

    let mut out = x.clone();
    let per_item = seq * features;
    if per_item == 0 {
        return Ok(out);
    }
    for (item, keep) in out.data_mut().chunks_mut(per_item).zip(keep) {
        if keep {
            item.iter_mut().for_each(|v| *v = *v * scale);
        } else {
            item.iter_mut().for_each(|v| *v = T::zero());
        }
    }
    Ok(out)
}
