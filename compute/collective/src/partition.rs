//! Distribution of diagonal rows across ranks
//!
//! There is no authoritative partition message: every rank derives the whole
//! layout on its own, so everything here must be a pure function of the
//! diagonal length and the number of ranks.

use std::ops::Range;

/// Rows of a `len`-cell diagonal that rank `rank` out of `ranks` computes
///
/// Every rank gets `len / ranks` consecutive rows, and the last rank also
/// takes the remaining `len % ranks` rows.
pub fn rank_rows(len: usize, rank: usize, ranks: usize) -> Range<usize> {
    assert!(rank < ranks, "rank {rank} does not exist among {ranks} ranks");
    let base = len / ranks;
    let start = rank * base;
    let end = if rank == ranks - 1 { len } else { start + base };
    start..end
}

/// Per-rank block sizes and offsets of a gathered diagonal
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GatherLayout {
    /// Number of cells contributed by each rank
    counts: Vec<usize>,

    /// Offset of each rank's contribution in the gathered diagonal
    displacements: Vec<usize>,

    /// Total number of gathered cells
    len: usize,
}
//
impl GatherLayout {
    /// Layout of a `len`-cell diagonal spread over `ranks` ranks
    pub fn new(len: usize, ranks: usize) -> Self {
        assert!(ranks > 0, "there must be at least one rank");
        let (counts, displacements) = (0..ranks)
            .map(|rank| {
                let rows = rank_rows(len, rank, ranks);
                (rows.len(), rows.start)
            })
            .unzip();
        Self {
            counts,
            displacements,
            len,
        }
    }

    /// Number of cells contributed by each rank
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Offset of each rank's contribution in the gathered diagonal
    pub fn displacements(&self) -> &[usize] {
        &self.displacements
    }

    /// Total number of gathered cells
    pub fn len(&self) -> usize {
        self.len
    }

    /// Truth that nothing is gathered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of ranks
    pub fn ranks(&self) -> usize {
        self.counts.len()
    }

    /// Position of a rank's contribution in the gathered diagonal
    pub fn block(&self, rank: usize) -> Range<usize> {
        let start = self.displacements[rank];
        start..start + self.counts[rank]
    }
}
