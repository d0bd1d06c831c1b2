//! Per-cell recurrence

use data::{matrix::TriangularMatrix, Precision};

/// Computation of one cell of the wavefront
///
/// A kernel computes cell `(row, row + diagonal)` from cells of diagonals
/// `0..diagonal`, which are guaranteed to be fully written by the time it is
/// called. It may be called concurrently for different rows of the same
/// diagonal, and must not write to the matrix.
pub trait Kernel: Sync {
    /// Compute the value of cell `(row, row + diagonal)`
    fn compute(&self, row: usize, diagonal: usize, matrix: &TriangularMatrix) -> Precision;
}
//
impl<F> Kernel for F
where
    F: Fn(usize, usize, &TriangularMatrix) -> Precision + Sync,
{
    #[inline]
    fn compute(&self, row: usize, diagonal: usize, matrix: &TriangularMatrix) -> Precision {
        self(row, diagonal, matrix)
    }
}

/// Cube root of the dot product of the cells on the left of the target in its
/// row and the cells below the target in its column
///
/// `value(m, m+k) = cbrt(sum(i in 0..k) value(m, m+i) * value(m+k-i, m+k))`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DotCbrt;
//
impl Kernel for DotCbrt {
    #[inline]
    fn compute(&self, m: usize, k: usize, matrix: &TriangularMatrix) -> Precision {
        let mut dot: Precision = 0.0;
        for i in 0..k {
            dot += matrix.read(m, m + i) * matrix.read(m + k - i, m + k);
        }
        dot.cbrt()
    }
}

/// Compute every cell of rows `rows` of diagonal `k` and store them
///
/// This is the inner loop of all backends that operate on a shared matrix.
#[inline]
pub fn compute_rows(
    kernel: &impl Kernel,
    k: usize,
    rows: std::ops::Range<usize>,
    matrix: &TriangularMatrix,
) {
    for m in rows {
        matrix.write(m, m + k, kernel.compute(m, k, matrix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_two() {
        let matrix = TriangularMatrix::new(2);
        let value = DotCbrt.compute(0, 1, &matrix);
        assert_eq!(value, 0.5f64.cbrt());
        assert!((value - 0.7937).abs() < 1e-4);
    }

    #[test]
    fn reads_all_lower_diagonals() {
        // With a 3x3 matrix, cell (0, 2) depends on (0, 0)*(2, 2) + (0, 1)*(1, 2)
        let matrix = TriangularMatrix::new(3);
        matrix.write(0, 1, 2.0);
        matrix.write(1, 2, 4.0);
        let expected = (1.0f64 / 3.0 * 1.0 + 2.0 * 4.0).cbrt();
        assert_eq!(DotCbrt.compute(0, 2, &matrix), expected);
    }

    #[test]
    fn negative_accumulator() {
        let matrix = TriangularMatrix::new(2);
        matrix.write(0, 0, -1.0);
        assert_eq!(DotCbrt.compute(0, 1, &matrix), -(1.0f64.cbrt()));
    }

    #[test]
    fn closures_are_kernels() {
        let matrix = TriangularMatrix::new(4);
        let kernel = |m: usize, k: usize, _: &TriangularMatrix| (m * 10 + k) as Precision;
        compute_rows(&kernel, 2, 0..2, &matrix);
        assert_eq!(matrix.diagonal(2), vec![2.0, 12.0]);
    }
}
