//! Distributed implementation of the wavefront computation
//!
//! Every rank holds a full replica of the matrix. For each diagonal, each rank
//! computes its own block of rows, then all ranks exchange their blocks through
//! an all-gather operation and apply the full diagonal to their replica. The
//! all-gather is a synchronization point, so no rank starts on a diagonal
//! before every rank has finished the previous one.
//!
//! [`run_rank()`] is the per-rank loop, which works with any [`Communicator`].
//! The [`Collective`] backend runs it on in-process ranks that share nothing
//! but message channels, while the `wavefront-mpi` binary runs it on MPI
//! processes.

pub mod communicator;
#[cfg(feature = "mpi")]
pub mod mpi;
pub mod partition;

use crate::{
    communicator::{ChannelCommunicator, CommError, Communicator},
    partition::GatherLayout,
};
use compute::{panic_message, Config, Kernel, Wavefront, WavefrontBase, WavefrontCreate};
use data::{diagonal_len, matrix::TriangularMatrix, Precision};
use log::{debug, trace};
use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    thread,
};
use thiserror::Error;

/// Compute all diagonals of `replica` as one rank of a communicator
///
/// Must be called by every rank of the communicator, with replicas whose main
/// diagonal is identical. When it returns successfully, all replicas hold the
/// same values.
pub fn run_rank<C: Communicator, K: Kernel>(
    comm: &mut C,
    kernel: &K,
    replica: &TriangularMatrix,
) -> Result<(), C::Error> {
    let size = replica.size();
    let (rank, ranks) = (comm.rank(), comm.size());
    let mut local = Vec::<Precision>::new();
    let mut global = Vec::<Precision>::new();
    for k in 1..size {
        let len = diagonal_len(size, k);
        let layout = GatherLayout::new(len, ranks);
        let rows = layout.block(rank);
        trace!("Rank {rank} computing rows {rows:?} of diagonal {k}");

        local.clear();
        local.extend(rows.map(|m| kernel.compute(m, k, replica)));

        global.clear();
        global.resize(len, 0.0);
        comm.all_gather_varcount(&local, &layout, &mut global)?;
        replica.write_diagonal(k, &global);
    }
    Ok(())
}

/// Collective wavefront backend with in-process ranks
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Collective {
    /// Number of ranks
    ranks: NonZeroUsize,
}
//
impl WavefrontBase for Collective {
    type Error = Error;
}
//
impl WavefrontCreate for Collective {
    fn new(config: &Config) -> Result<Self, Error> {
        debug!("Set up collective backend with {} ranks", config.workers);
        Ok(Self {
            ranks: config.workers,
        })
    }
}
//
impl Wavefront for Collective {
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Error> {
        let results = thread::scope(|s| {
            let mut ranks = Vec::with_capacity(self.ranks.get());
            let mut spawn_error = None;
            for mut comm in ChannelCommunicator::group(self.ranks.get()) {
                let rank = comm.rank();
                let abort = comm.abort_handle();
                let replica = matrix.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(s, move || {
                        match panic::catch_unwind(AssertUnwindSafe(|| {
                            run_rank(&mut comm, kernel, &replica)
                        })) {
                            Ok(Ok(())) => Ok(replica),
                            Ok(Err(e)) => Err(Error::Communication(e)),
                            Err(payload) => {
                                comm.abort_handle().abort();
                                Err(Error::RankPanicked {
                                    rank,
                                    message: panic_message(&*payload),
                                })
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => ranks.push(handle),
                    Err(e) => {
                        // Ranks that were already started would wait forever
                        abort.abort();
                        spawn_error = Some(Error::Spawn(e));
                        break;
                    }
                }
            }
            let mut results = ranks
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|payload| {
                        Err(Error::RankPanicked {
                            rank,
                            message: panic_message(&*payload),
                        })
                    })
                })
                .collect::<Vec<_>>();
            results.extend(spawn_error.map(Err));
            results
        });

        // Report the root cause of a failure rather than its consequences
        let mut replicas = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(replica) => replicas.push(replica),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            let root_cause = errors
                .iter()
                .position(|e| !e.is_consequence())
                .unwrap_or(0);
            return Err(errors.swap_remove(root_cause));
        }

        let first = &replicas[0];
        debug_assert!(
            replicas.iter().all(|replica| {
                replica.to_array().mapv(Precision::to_bits)
                    == first.to_array().mapv(Precision::to_bits)
            }),
            "rank replicas disagree after the final all-gather"
        );
        matrix.copy_from(first);
        Ok(())
    }
}

/// Things that can go wrong when running the in-process collective backend
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to spawn a rank thread
    #[error("failed to spawn rank thread")]
    Spawn(#[source] std::io::Error),

    /// A collective operation failed
    #[error(transparent)]
    Communication(#[from] CommError),

    /// A rank panicked
    #[error("rank {rank} panicked: {message}")]
    RankPanicked { rank: usize, message: String },
}
//
impl Error {
    /// Truth that this error only reports the failure of another rank
    fn is_consequence(&self) -> bool {
        matches!(
            self,
            Self::Communication(CommError::PeerAborted { .. } | CommError::Disconnected { .. })
        )
    }
}
