//! Data format used by the wavefront computation

pub mod matrix;

/// Computation precision
pub type Precision = f64;

/// Number of cells on diagonal `k` of a `size`x`size` matrix
///
/// Diagonal `k` is made of cells `(m, m + k)` for `m` in `0..size - k`.
#[inline]
pub fn diagonal_len(size: usize, k: usize) -> usize {
    debug_assert!(k <= size);
    size - k
}
