//! MPI transport, where each rank is an OS process

use crate::{
    communicator::{check_buffers, Communicator, LengthMismatch},
    partition::GatherLayout,
};
use data::Precision;
use ::mpi::{
    datatype::PartitionMut,
    topology::SimpleCommunicator,
    traits::{Communicator as _, CommunicatorCollectives as _},
    Count,
};
use thiserror::Error;

/// Communicator backed by an MPI communicator
///
/// MPI itself aborts the job on communication errors, so the only errors that
/// are reported here are detected before calling into MPI.
#[derive(Debug)]
pub struct MpiCommunicator {
    /// Underlying MPI communicator
    world: SimpleCommunicator,
}
//
impl MpiCommunicator {
    /// Wrap an MPI communicator, usually `universe.world()`
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}
//
impl Communicator for MpiCommunicator {
    type Error = MpiError;

    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_gather_varcount(
        &mut self,
        local: &[Precision],
        layout: &GatherLayout,
        global: &mut [Precision],
    ) -> Result<(), MpiError> {
        check_buffers(self.rank(), local, layout, global)?;
        let counts = to_counts(layout.counts())?;
        let displacements = to_counts(layout.displacements())?;
        let mut partition = PartitionMut::new(global, &counts[..], &displacements[..]);
        self.world.all_gather_varcount_into(local, &mut partition);
        Ok(())
    }
}

/// Convert buffer sizes or offsets to MPI's integer type
fn to_counts(values: &[usize]) -> Result<Vec<Count>, MpiError> {
    values
        .iter()
        .map(|&value| Count::try_from(value).map_err(|_| MpiError::CountOverflow(value)))
        .collect()
}

/// Things that can go wrong before a collective operation reaches MPI
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum MpiError {
    /// Buffer does not have the expected number of values
    #[error(transparent)]
    LengthMismatch(#[from] LengthMismatch),

    /// A buffer size or offset does not fit in MPI's count type
    #[error("{0} values cannot be described by an MPI count")]
    CountOverflow(usize),
}
