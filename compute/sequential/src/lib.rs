//! Sequential implementation of the wavefront computation
//!
//! Computes diagonals one after another and cells within a diagonal in
//! increasing row order, on the calling thread. This is the reference that the
//! parallel backends are checked against, and the fastest option for small
//! matrices where parallelization overhead dominates.

use compute::{kernel::compute_rows, Config, Kernel, Wavefront, WavefrontBase, WavefrontCreate};
use data::{diagonal_len, matrix::TriangularMatrix};
use std::convert::Infallible;

/// Single-threaded wavefront backend
#[derive(Copy, Clone, Debug, Default)]
pub struct Sequential;
//
impl WavefrontBase for Sequential {
    type Error = Infallible;
}
//
impl WavefrontCreate for Sequential {
    fn new(_config: &Config) -> Result<Self, Infallible> {
        Ok(Self)
    }
}
//
impl Wavefront for Sequential {
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Infallible> {
        let size = matrix.size();
        log::debug!("Running sequential wavefront on a {size}x{size} matrix");
        for k in 1..size {
            compute_rows(kernel, k, 0..diagonal_len(size, k), matrix);
        }
        Ok(())
    }
}
