use crate::{check_batch_dims, KernelElem, KernelError, Result};
use rayon::prelude::*;

/// CPU matrix multiplication: `[..., M, K] x [..., K, N] -> [..., M, N]`.
///
/// The right-hand side is transposed once up front so every output element is a
/// dot product of two contiguous rows, then the work is handed to
/// [`cpu_matmul_nt`].
pub fn cpu_matmul<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let k = lhs_shape[RANK - 1];
    if k != rhs_shape[RANK - 2] {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 2]],
        });
    }

    // rhs is [..., K, N], we want [..., N, K]
    let rhs_t_data = super::cpu_transpose::cpu_transpose(rhs_data, rhs_shape)?;
    let mut rhs_t_shape = *rhs_shape;
    rhs_t_shape.swap(RANK - 1, RANK - 2);

    cpu_matmul_nt(lhs_data, &rhs_t_data, lhs_shape, &rhs_t_shape)
}

/// CPU matrix multiplication against a transposed right-hand side:
/// `[..., M, K] x [..., N, K]ᵀ -> [..., M, N]`.
///
/// This is the natural layout for `x · Wᵀ` with a `[out, in]` weight and for
/// attention scores `q · kᵀ`, so neither needs a materialized transpose.
pub fn cpu_matmul_nt<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = lhs_shape[RANK - 2];
    let k = lhs_shape[RANK - 1];
    let n = rhs_shape[RANK - 2];

    if k != rhs_shape[RANK - 1] {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 1]],
        });
    }
    check_batch_dims(lhs_shape, rhs_shape)?;

    let batch: usize = lhs_shape[..RANK - 2].iter().product();
    let mut out_data = vec![T::zero(); batch * m * n];
    if n == 0 {
        return Ok(out_data);
    }

    // Parallelize over rows of the output matrices across all batches:
    // (Batch... * M) rows, each of size N.
    out_data
        .as_mut_slice()
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(global_row_idx, out_row)| {
            let batch_idx = global_row_idx / m;
            let row_in_matrix = global_row_idx % m;

            let a_row_start = batch_idx * m * k + row_in_matrix * k;
            let a_slice = &lhs_data[a_row_start..a_row_start + k];
            let b_batch_offset = batch_idx * n * k;

            for (col, out_elem) in out_row.iter_mut().enumerate() {
                let b_row_start = b_batch_offset + col * k;
                let b_slice = &rhs_data[b_row_start..b_row_start + k];

                let mut sum = T::zero();
                for (&val_a, &val_b) in a_slice.iter().zip(b_slice.iter()) {
                    sum += val_a * val_b;
                }
                *out_elem = sum;
            }
        });

    Ok(out_data)
}
