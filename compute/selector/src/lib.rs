//! Pick a compute backend at run time, expose it as an [`Engine`]
//!
//! All backends are always built, so that their outputs can be compared
//! within a single process.

use clap::ValueEnum;
use compute::{Config, ConfigError, Kernel, Wavefront, WavefrontBase, WavefrontCreate};
use compute_collective::Collective;
use compute_farm::Farm;
use compute_forkjoin::ForkJoin;
use compute_sequential::Sequential;
use data::matrix::TriangularMatrix;
use std::convert::Infallible;
use thiserror::Error;

/// Available compute backends
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, ValueEnum)]
pub enum Backend {
    /// Single-threaded reference implementation
    Sequential,

    /// Thread pool with a barrier after each diagonal
    ForkJoin,

    /// Coordinator and workers exchanging tasks and completion signals
    #[default]
    Farm,

    /// Ranks with private replicas exchanging diagonals through all-gathers
    Collective,
}
//
impl Backend {
    /// All available backends
    pub const ALL: [Self; 4] = [
        Self::Sequential,
        Self::ForkJoin,
        Self::Farm,
        Self::Collective,
    ];
}

/// Compute backend selected at run time
#[derive(Debug)]
pub enum Engine {
    Sequential(Sequential),
    ForkJoin(ForkJoin),
    Farm(Farm),
    Collective(Collective),
}
//
impl Engine {
    /// Set up the requested backend
    pub fn new(backend: Backend, config: &Config) -> Result<Self, Error> {
        log::debug!("Selected the {backend:?} backend");
        Ok(match backend {
            Backend::Sequential => Self::Sequential(Sequential::new(config)?),
            Backend::ForkJoin => Self::ForkJoin(ForkJoin::new(config)?),
            Backend::Farm => Self::Farm(Farm::new(config)?),
            Backend::Collective => Self::Collective(Collective::new(config)?),
        })
    }

    /// Backend that this engine runs
    pub fn backend(&self) -> Backend {
        match self {
            Self::Sequential(_) => Backend::Sequential,
            Self::ForkJoin(_) => Backend::ForkJoin,
            Self::Farm(_) => Backend::Farm,
            Self::Collective(_) => Backend::Collective,
        }
    }
}
//
impl WavefrontBase for Engine {
    type Error = Error;
}
//
impl Wavefront for Engine {
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Error> {
        match self {
            Self::Sequential(backend) => backend.run(kernel, matrix)?,
            Self::ForkJoin(backend) => backend.run(kernel, matrix)?,
            Self::Farm(backend) => backend.run(kernel, matrix)?,
            Self::Collective(backend) => backend.run(kernel, matrix)?,
        }
        Ok(())
    }
}

/// Errors from any backend, or from run configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid run parameters
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fork-join backend error
    #[error(transparent)]
    ForkJoin(#[from] compute_forkjoin::Error),

    /// Farm backend error
    #[error(transparent)]
    Farm(#[from] compute_farm::Error),

    /// Collective backend error
    #[error(transparent)]
    Collective(#[from] compute_collective::Error),
}
//
impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
