//! Splitting of diagonals into tasks

use data::diagonal_len;
use std::{num::NonZeroUsize, ops::Range};

/// Split `0..len` into consecutive chunks of at most `granularity` elements
///
/// Chunks are emitted in increasing order, do not overlap, and cover the whole
/// range. Only the last chunk may be shorter than `granularity`.
pub fn split(len: usize, granularity: NonZeroUsize) -> Chunks {
    Chunks {
        next_start: 0,
        len,
        granularity: granularity.get(),
    }
}

/// Iterator over the chunks of a range, see [`split()`]
#[derive(Clone, Debug)]
pub struct Chunks {
    next_start: usize,
    len: usize,
    granularity: usize,
}
//
impl Iterator for Chunks {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.next_start >= self.len {
            return None;
        }
        let start = self.next_start;
        let end = start.saturating_add(self.granularity).min(self.len);
        self.next_start = end;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len.saturating_sub(self.next_start).div_ceil(self.granularity);
        (len, Some(len))
    }
}
//
impl ExactSizeIterator for Chunks {}

/// Unit of work distribution: a contiguous range of rows within a diagonal
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Task {
    /// Diagonal index
    pub diagonal: usize,

    /// Rows `m` of cells `(m, m + diagonal)` to be computed
    pub rows: Range<usize>,
}

/// Split diagonal `diagonal` of a `size`x`size` matrix into tasks
pub fn tasks(diagonal: usize, size: usize, granularity: NonZeroUsize) -> Tasks {
    Tasks {
        diagonal,
        chunks: split(diagonal_len(size, diagonal), granularity),
    }
}

/// Iterator over the tasks of a diagonal, see [`tasks()`]
#[derive(Clone, Debug)]
pub struct Tasks {
    diagonal: usize,
    chunks: Chunks,
}
//
impl Iterator for Tasks {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        self.chunks.next().map(|rows| Task {
            diagonal: self.diagonal,
            rows,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}
//
impl ExactSizeIterator for Tasks {}

/// Largest number of tasks that any diagonal of a `size`x`size` matrix is
/// split into
pub fn max_tasks_per_diagonal(size: usize, granularity: NonZeroUsize) -> usize {
    size.saturating_sub(1).div_ceil(granularity.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nz(x: usize) -> NonZeroUsize {
        NonZeroUsize::new(x).unwrap()
    }

    #[test]
    fn last_chunk_is_shorter() {
        assert_eq!(split(7, nz(3)).collect::<Vec<_>>(), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn coarse_granularity_is_one_chunk() {
        assert_eq!(split(5, nz(5)).collect::<Vec<_>>(), vec![0..5]);
        assert_eq!(split(5, nz(usize::MAX)).collect::<Vec<_>>(), vec![0..5]);
    }

    #[test]
    fn empty_range() {
        assert_eq!(split(0, nz(4)).count(), 0);
    }

    #[test]
    fn diagonal_tasks() {
        let tasks = tasks(2, 6, nz(3)).collect::<Vec<_>>();
        assert_eq!(
            tasks,
            vec![
                Task {
                    diagonal: 2,
                    rows: 0..3
                },
                Task {
                    diagonal: 2,
                    rows: 3..4
                },
            ]
        );
        assert_eq!(max_tasks_per_diagonal(6, nz(3)), 2);
        assert_eq!(max_tasks_per_diagonal(1, nz(3)), 0);
    }

    proptest! {
        #[test]
        fn chunks_cover_range(len in 0usize..1000, granularity in 1usize..100) {
            let chunks = split(len, nz(granularity));
            let expected_count = chunks.len();
            let mut next = 0;
            let mut count = 0;
            for chunk in chunks {
                prop_assert_eq!(chunk.start, next);
                prop_assert!(chunk.end > chunk.start);
                prop_assert!(chunk.len() <= granularity);
                next = chunk.end;
                count += 1;
            }
            prop_assert_eq!(next, len);
            prop_assert_eq!(count, expected_count);
        }

        #[test]
        fn task_count_is_bounded(size in 1usize..500, granularity in 1usize..50) {
            let max = max_tasks_per_diagonal(size, nz(granularity));
            for k in 1..size {
                prop_assert!(tasks(k, size, nz(granularity)).len() <= max);
            }
        }
    }
}
