//! Triangular matrix storage
//!
//! The wavefront computation fills in the upper triangle of a square matrix,
//! one diagonal at a time. Cells of the same diagonal are computed in parallel
//! by multiple threads which all read previously computed diagonals, so the
//! storage must be writable through a shared reference.
//!
//! This is achieved by storing each cell as an [`AtomicU64`] holding the bits
//! of a [`Precision`] value, and using relaxed loads and stores. These compile
//! down to plain memory accesses on all mainstream CPUs, so there is no locking
//! and no extra cost over a raw buffer. Ordering between diagonals is the job
//! of the compute backends, which synchronize (barrier, channel message or
//! collective exchange) before starting a new diagonal.

use crate::{diagonal_len, Precision};
use ndarray::Array2;
use std::{
    fmt::{self, Debug},
    sync::atomic::{AtomicU64, Ordering},
};

/// Square matrix whose upper triangle is computed by the wavefront
pub struct TriangularMatrix {
    /// Number of rows and columns
    size: usize,

    /// Row-major cell storage, as bit patterns of `Precision` values
    cells: Box<[AtomicU64]>,
}
//
impl TriangularMatrix {
    /// Allocate a `size`x`size` matrix and seed its main diagonal
    pub fn new(size: usize) -> Self {
        let cells = std::iter::repeat_with(|| AtomicU64::new(0.0f64.to_bits()))
            .take(size * size)
            .collect();
        let result = Self { size, cells };
        result.init();
        result
    }

    /// Set the main diagonal to `(i + 1) / size`
    ///
    /// This is done once before any wavefront work starts, and the main
    /// diagonal is never recomputed afterwards.
    pub fn init(&self) {
        let size = self.size as Precision;
        for i in 0..self.size {
            self.write(i, i, (i + 1) as Precision / size);
        }
    }

    /// Number of rows and columns
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read a cell
    ///
    /// The caller is responsible for only reading cells that have already been
    /// computed, no dependency tracking is performed here.
    #[inline]
    pub fn read(&self, row: usize, col: usize) -> Precision {
        Precision::from_bits(self.cell(row, col).load(Ordering::Relaxed))
    }

    /// Write a cell
    ///
    /// Each cell is expected to be written at most once per wavefront run, and
    /// never concurrently with another access to the same cell.
    #[inline]
    pub fn write(&self, row: usize, col: usize, value: Precision) {
        self.cell(row, col).store(value.to_bits(), Ordering::Relaxed)
    }

    /// Collect the values of diagonal `k`, ordered by row
    pub fn diagonal(&self, k: usize) -> Vec<Precision> {
        (0..diagonal_len(self.size, k))
            .map(|m| self.read(m, m + k))
            .collect()
    }

    /// Overwrite diagonal `k` with `values`, ordered by row
    pub fn write_diagonal(&self, k: usize, values: &[Precision]) {
        assert_eq!(
            values.len(),
            diagonal_len(self.size, k),
            "diagonal {k} has the wrong number of values"
        );
        for (m, &value) in values.iter().enumerate() {
            self.write(m, m + k, value);
        }
    }

    /// Overwrite the contents of this matrix with those of another
    pub fn copy_from(&self, other: &Self) {
        assert_eq!(self.size, other.size, "matrix sizes do not match");
        for (dst, src) in self.cells.iter().zip(other.cells.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    /// Snapshot of the full matrix, lower triangle included
    pub fn to_array(&self) -> Array2<Precision> {
        Array2::from_shape_fn((self.size, self.size), |(row, col)| {
            Precision::from_bits(self.cells[row * self.size + col].load(Ordering::Relaxed))
        })
    }

    /// Bounds-checked access to the storage of a cell
    #[inline]
    fn cell(&self, row: usize, col: usize) -> &AtomicU64 {
        assert!(
            row < self.size && col < self.size,
            "cell ({row}, {col}) is out of bounds for a {0}x{0} matrix",
            self.size
        );
        debug_assert!(row <= col, "cell ({row}, {col}) is below the main diagonal");
        &self.cells[row * self.size + col]
    }
}
//
impl Clone for TriangularMatrix {
    fn clone(&self) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|cell| AtomicU64::new(cell.load(Ordering::Relaxed)))
            .collect();
        Self {
            size: self.size,
            cells,
        }
    }
}
//
impl Debug for TriangularMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriangularMatrix")
            .field("size", &self.size)
            .field("cells", &self.to_array())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn main_diagonal_is_seeded() {
        let matrix = TriangularMatrix::new(4);
        assert_eq!(matrix.diagonal(0), vec![0.25, 0.5, 0.75, 1.0]);
        for k in 1..4 {
            assert!(matrix.diagonal(k).iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn single_cell() {
        let matrix = TriangularMatrix::new(1);
        assert_eq!(matrix.to_array(), ndarray::array![[1.0]]);
    }

    #[test]
    fn empty() {
        let matrix = TriangularMatrix::new(0);
        assert_eq!(matrix.size(), 0);
        assert_eq!(matrix.to_array().len(), 0);
    }

    #[test]
    fn diagonal_write_then_read() {
        let matrix = TriangularMatrix::new(5);
        matrix.write_diagonal(2, &[1.0, -2.0, 3.5]);
        assert_eq!(matrix.read(0, 2), 1.0);
        assert_eq!(matrix.read(1, 3), -2.0);
        assert_eq!(matrix.read(2, 4), 3.5);
        assert_eq!(matrix.diagonal(2), vec![1.0, -2.0, 3.5]);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_read() {
        TriangularMatrix::new(3).read(1, 3);
    }

    #[test]
    #[should_panic]
    fn wrong_diagonal_length() {
        TriangularMatrix::new(3).write_diagonal(1, &[1.0]);
    }

    #[test]
    fn clones_are_independent() {
        let matrix = TriangularMatrix::new(3);
        let replica = matrix.clone();
        replica.write(0, 2, 42.0);
        assert_eq!(matrix.read(0, 2), 0.0);
        matrix.copy_from(&replica);
        assert_eq!(matrix.read(0, 2), 42.0);
    }

    proptest! {
        #[test]
        fn seeded_diagonal_ends_at_one(size in 1usize..64) {
            let matrix = TriangularMatrix::new(size);
            prop_assert_eq!(matrix.read(size - 1, size - 1), 1.0);
            let diagonal = matrix.diagonal(0);
            prop_assert!(diagonal.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
