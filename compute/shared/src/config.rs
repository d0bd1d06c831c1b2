//! Run configuration

use std::num::NonZeroUsize;
use thiserror::Error;

/// Parameters of a wavefront run
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// Number of rows and columns of the matrix
    pub size: usize,

    /// Number of worker threads, or of ranks for the collective backend
    pub workers: NonZeroUsize,

    /// Maximal number of cells bundled into one task
    pub granularity: NonZeroUsize,
}
//
impl Config {
    /// Validate raw user-provided parameters
    pub fn new(size: usize, workers: usize, granularity: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::EmptyMatrix);
        }
        Ok(Self {
            size,
            workers: NonZeroUsize::new(workers).ok_or(ConfigError::NoWorkers)?,
            granularity: NonZeroUsize::new(granularity).ok_or(ConfigError::ZeroGranularity)?,
        })
    }
}

/// Invalid run parameters
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ConfigError {
    /// Matrix size was zero
    #[error("matrix size must be at least 1")]
    EmptyMatrix,

    /// Worker count was zero
    #[error("at least one worker is needed")]
    NoWorkers,

    /// Granularity was zero
    #[error("task granularity must be at least 1 cell")]
    ZeroGranularity,
}
