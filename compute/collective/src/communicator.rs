//! Collective communication between ranks

use crate::partition::GatherLayout;
use crossbeam_channel::{Receiver, Sender};
use data::Precision;
use std::sync::Arc;
use thiserror::Error;

/// Group of ranks that can exchange diagonals
///
/// Every rank of the group must take part in every collective operation, in
/// the same order.
pub trait Communicator {
    /// Error reported by collective operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Index of this rank within the group
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Gather the contributions of all ranks into `global`, on every rank
    ///
    /// `local` must contain `layout.counts()[self.rank()]` values, which end up
    /// at offset `layout.displacements()[self.rank()]` of `global` on every
    /// rank. `global` must contain `layout.len()` values. This does not return
    /// before all ranks have contributed.
    fn all_gather_varcount(
        &mut self,
        local: &[Precision],
        layout: &GatherLayout,
        global: &mut [Precision],
    ) -> Result<(), Self::Error>;
}

/// Check the buffer sizes of an all-gather operation
pub(crate) fn check_buffers(
    rank: usize,
    local: &[Precision],
    layout: &GatherLayout,
    global: &[Precision],
) -> Result<(), LengthMismatch> {
    let expected = layout.counts()[rank];
    if local.len() != expected {
        return Err(LengthMismatch {
            expected,
            actual: local.len(),
        });
    }
    if global.len() != layout.len() {
        return Err(LengthMismatch {
            expected: layout.len(),
            actual: global.len(),
        });
    }
    Ok(())
}

/// Buffer does not have the expected number of values
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
#[error("expected {expected} values, got {actual}")]
pub struct LengthMismatch {
    /// Expected number of values
    pub expected: usize,

    /// Actual number of values
    pub actual: usize,
}

/// Message exchanged between in-process ranks
#[derive(Debug)]
enum Packet {
    /// Contribution of a rank to an all-gather operation
    Block {
        round: u64,
        rank: usize,
        values: Arc<[Precision]>,
    },

    /// A rank failed and will not take part in further operations
    Abort { rank: usize },
}

/// In-process communicator whose ranks only share message channels
///
/// Each rank is meant to run on its own thread with its own copy of the data,
/// mimicking a group of processes.
#[derive(Debug)]
pub struct ChannelCommunicator {
    /// Index of this rank
    rank: usize,

    /// Senders to the inbox of every other rank (`None` for this rank)
    peers: Vec<Option<Sender<Packet>>>,

    /// Incoming messages from other ranks
    inbox: Receiver<Packet>,

    /// Index of the next all-gather operation
    round: u64,

    /// Contributions to the next round from ranks that are ahead of us
    early: Vec<(usize, Arc<[Precision]>)>,
}
//
impl ChannelCommunicator {
    /// Set up a group of `size` ranks, ordered by rank
    pub fn group(size: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                inbox,
                round: 0,
                early: Vec::new(),
            })
            .collect()
    }

    /// Handle that can tell the other ranks that this one failed
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            rank: self.rank,
            peers: self.peers.iter().flatten().cloned().collect(),
        }
    }

    /// Record a contribution from another rank
    fn accept(
        &self,
        rank: usize,
        values: &[Precision],
        layout: &GatherLayout,
        global: &mut [Precision],
        received: &mut [bool],
    ) -> Result<(), CommError> {
        if received[rank] {
            return Err(CommError::DuplicateBlock { rank });
        }
        let block = layout.block(rank);
        if values.len() != block.len() {
            return Err(LengthMismatch {
                expected: block.len(),
                actual: values.len(),
            }
            .into());
        }
        global[block].copy_from_slice(values);
        received[rank] = true;
        Ok(())
    }
}
//
impl Communicator for ChannelCommunicator {
    type Error = CommError;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn all_gather_varcount(
        &mut self,
        local: &[Precision],
        layout: &GatherLayout,
        global: &mut [Precision],
    ) -> Result<(), CommError> {
        check_buffers(self.rank, local, layout, global)?;
        let round = self.round;
        self.round += 1;

        // Send our contribution to everyone else
        let values: Arc<[Precision]> = local.into();
        for (peer, sender) in self.peers.iter().enumerate() {
            if let Some(sender) = sender {
                sender
                    .send(Packet::Block {
                        round,
                        rank: self.rank,
                        values: values.clone(),
                    })
                    .map_err(|_| CommError::Disconnected { peer })?;
            }
        }
        global[layout.block(self.rank)].copy_from_slice(local);

        // Collect everyone else's contribution, starting with those that
        // arrived while we were still busy with the previous round
        let mut received = vec![false; self.size()];
        received[self.rank] = true;
        let mut missing = self.size() - 1;
        for (rank, values) in std::mem::take(&mut self.early) {
            self.accept(rank, &values, layout, global, &mut received)?;
            missing -= 1;
        }
        while missing > 0 {
            match self.inbox.recv() {
                Ok(Packet::Block {
                    round: packet_round,
                    rank,
                    values,
                }) => {
                    if packet_round == round {
                        self.accept(rank, &values, layout, global, &mut received)?;
                        missing -= 1;
                    } else if packet_round == round + 1 {
                        // A peer can be at most one round ahead, since it
                        // needs our contribution to finish this round
                        self.early.push((rank, values));
                    } else {
                        return Err(CommError::UnexpectedRound {
                            expected: round,
                            received: packet_round,
                        });
                    }
                }
                Ok(Packet::Abort { rank }) => return Err(CommError::PeerAborted { rank }),
                Err(_) => {
                    let peer = received.iter().position(|&done| !done).unwrap_or(self.rank);
                    return Err(CommError::Disconnected { peer });
                }
            }
        }
        Ok(())
    }
}

/// Means for a failed rank to notify the others, see
/// [`ChannelCommunicator::abort_handle()`]
#[derive(Clone, Debug)]
pub struct AbortHandle {
    /// Rank that failed
    rank: usize,

    /// Senders to every other rank
    peers: Vec<Sender<Packet>>,
}
//
impl AbortHandle {
    /// Tell all other ranks that this rank will not take part in further
    /// collective operations
    pub fn abort(&self) {
        for peer in &self.peers {
            // Peers that already hung up do not need to be told
            let _ = peer.send(Packet::Abort { rank: self.rank });
        }
    }
}

/// Things that can go wrong during in-process collective operations
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum CommError {
    /// Buffer or contribution has the wrong size
    #[error(transparent)]
    LengthMismatch(#[from] LengthMismatch),

    /// Another rank failed
    #[error("rank {rank} aborted")]
    PeerAborted { rank: usize },

    /// Another rank hung up without notice
    #[error("rank {peer} is not reachable anymore")]
    Disconnected { peer: usize },

    /// Received a contribution from an unexpected all-gather operation
    #[error("expected a contribution to round {expected}, got one for round {received}")]
    UnexpectedRound { expected: u64, received: u64 },

    /// Received two contributions from the same rank in one round
    #[error("rank {rank} contributed twice to the same round")]
    DuplicateBlock { rank: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Run the same gather sequence on every rank of a group
    fn gather_rounds(size: usize, lens: &[usize]) -> Vec<Vec<Vec<Precision>>> {
        let group = ChannelCommunicator::group(size);
        thread::scope(|s| {
            let handles = group
                .into_iter()
                .map(|mut comm| {
                    s.spawn(move || {
                        lens.iter()
                            .map(|&len| {
                                let layout = GatherLayout::new(len, comm.size());
                                let local = layout
                                    .block(comm.rank())
                                    .map(|m| (m * 100 + len) as Precision)
                                    .collect::<Vec<_>>();
                                let mut global = vec![0.0; len];
                                comm.all_gather_varcount(&local, &layout, &mut global)
                                    .unwrap();
                                global
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn every_rank_gets_everything() {
        let lens = [9, 8, 7, 3, 2, 1, 0];
        for size in 1..5 {
            for per_rank in gather_rounds(size, &lens) {
                for (&len, global) in lens.iter().zip(per_rank) {
                    let expected = (0..len)
                        .map(|m| (m * 100 + len) as Precision)
                        .collect::<Vec<_>>();
                    assert_eq!(global, expected);
                }
            }
        }
    }

    #[test]
    fn wrong_local_length() {
        let mut group = ChannelCommunicator::group(1);
        let layout = GatherLayout::new(3, 1);
        let mut global = vec![0.0; 3];
        assert_eq!(
            group[0].all_gather_varcount(&[1.0], &layout, &mut global),
            Err(CommError::LengthMismatch(LengthMismatch {
                expected: 3,
                actual: 1
            }))
        );
    }

    #[test]
    fn abort_reaches_peers() {
        let mut group = ChannelCommunicator::group(3);
        group[2].abort_handle().abort();
        let layout = GatherLayout::new(3, 3);
        let mut global = vec![0.0; 3];
        assert_eq!(
            group[0].all_gather_varcount(&[1.0], &layout, &mut global),
            Err(CommError::PeerAborted { rank: 2 })
        );
    }
}
