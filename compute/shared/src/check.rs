//! Validation of the diagonal ordering guarantee
//!
//! Parallel backends must finish writing diagonal `k` before any cell of
//! diagonal `k + 1` is computed. A backend that gets this wrong will usually
//! still produce plausible-looking numbers, so this module provides a kernel
//! wrapper that checks the guarantee directly.

use crate::Kernel;
use data::{diagonal_len, matrix::TriangularMatrix, Precision};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Kernel wrapper which asserts that every diagonal below the one being
/// computed has been fully computed and stored
///
/// Each result is recorded before being handed to the backend. When a cell of
/// diagonal `k` is computed, the wrapper checks that all cells of diagonals
/// `1..k` were computed and that the matrix holds the recorded values for
/// them. Violations are reported by panicking, which backends surface as an
/// execution error.
///
/// The checks cost `O(size^2)` per cell, so this is only meant for small
/// matrices.
#[derive(Debug)]
pub struct OrderCheck<K: Kernel> {
    /// Kernel that actually computes values
    inner: K,

    /// Number of rows and columns of the checked matrix
    size: usize,

    /// Number of computed cells, per diagonal
    computed: Box<[AtomicUsize]>,

    /// Bits of the computed values, indexed like the matrix
    values: Box<[AtomicU64]>,
}
//
impl<K: Kernel> OrderCheck<K> {
    /// Wrap a kernel for use on a `size`x`size` matrix
    pub fn new(inner: K, size: usize) -> Self {
        Self {
            inner,
            size,
            computed: std::iter::repeat_with(AtomicUsize::default)
                .take(size)
                .collect(),
            values: std::iter::repeat_with(AtomicU64::default)
                .take(size * size)
                .collect(),
        }
    }

    /// Number of cells of diagonal `k` which were computed so far
    pub fn computed_cells(&self, k: usize) -> usize {
        self.computed[k].load(Ordering::Acquire)
    }

    /// Truth that every off-diagonal cell was computed exactly once
    pub fn is_complete(&self) -> bool {
        (1..self.size).all(|k| self.computed_cells(k) == diagonal_len(self.size, k))
    }
}
//
impl<K: Kernel> Kernel for OrderCheck<K> {
    fn compute(&self, m: usize, k: usize, matrix: &TriangularMatrix) -> Precision {
        assert_eq!(matrix.size(), self.size, "checked a matrix of the wrong size");
        for lower in 1..k {
            let computed = self.computed_cells(lower);
            assert_eq!(
                computed,
                diagonal_len(self.size, lower),
                "cell ({m}, {}) of diagonal {k} computed while diagonal {lower} only has {computed} cells",
                m + k,
            );
            for row in 0..diagonal_len(self.size, lower) {
                let col = row + lower;
                let expected = Precision::from_bits(
                    self.values[row * self.size + col].load(Ordering::Relaxed),
                );
                let actual = matrix.read(row, col);
                assert!(
                    actual.to_bits() == expected.to_bits(),
                    "cell ({row}, {col}) holds {actual} instead of computed value {expected}"
                );
            }
        }

        let value = self.inner.compute(m, k, matrix);
        self.values[m * self.size + m + k].store(value.to_bits(), Ordering::Relaxed);
        let previous = self.computed[k].fetch_add(1, Ordering::Release);
        assert!(
            previous < diagonal_len(self.size, k),
            "diagonal {k} has more cells computed than it contains"
        );
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kernel::compute_rows, DotCbrt};

    #[test]
    fn accepts_ordered_run() {
        let matrix = TriangularMatrix::new(5);
        let check = OrderCheck::new(DotCbrt, 5);
        for k in 1..5 {
            compute_rows(&check, k, 0..diagonal_len(5, k), &matrix);
        }
        assert!(check.is_complete());
    }

    #[test]
    #[should_panic]
    fn rejects_early_diagonal() {
        let matrix = TriangularMatrix::new(5);
        let check = OrderCheck::new(DotCbrt, 5);
        compute_rows(&check, 1, 0..3, &matrix);
        compute_rows(&check, 2, 0..1, &matrix);
    }

    #[test]
    #[should_panic]
    fn rejects_unwritten_values() {
        let matrix = TriangularMatrix::new(3);
        let check = OrderCheck::new(DotCbrt, 3);
        check.compute(0, 1, &matrix);
        check.compute(1, 1, &matrix);
        check.compute(0, 2, &matrix);
    }
}
