use crate::{KernelElem, Result};
use rayon::prelude::*;

/// CPU transpose of the last two dimensions: `[..., M, N] -> [..., N, M]`.
pub fn cpu_transpose<T, const RANK: usize>(data: &[T], shape: &[usize; RANK]) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = shape[RANK - 2];
    let n = shape[RANK - 1];

    let size: usize = shape.iter().product();
    let mut out_data = vec![T::zero(); size];
    if m == 0 {
        return Ok(out_data);
    }

    // The output is viewed as `batch * N` rows of length `M`; output row `i`
    // is column `i % N` of input matrix `i / N`.
    out_data
        .as_mut_slice()
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(i, out_row)| {
            let batch_idx = i / n;
            let col_idx = i % n;
            let input_batch_offset = batch_idx * m * n;

            for (r, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[input_batch_offset + r * n + col_idx];
            }
        });

    Ok(out_data)
}
