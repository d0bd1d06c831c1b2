//! This crate collects elements that are shared between the CLI programs
//! wavefront and wavefront-mpi.

use clap::Args;
use compute::{Config, ConfigError};
use data::matrix::TriangularMatrix;
use std::{fmt::Write as _, num::NonZeroUsize, thread, time::Duration};

/// CLI arguments shared by the "wavefront" and "wavefront-mpi" executables
#[derive(Args, Clone, Debug)]
pub struct SharedArgs {
    /// Number of rows and columns of the matrix
    #[arg(short = 'n', long, visible_alias = "matrix_size", env = "MATRIX_SIZE")]
    pub matrix_size: usize,

    /// Number of worker threads (default: available parallelism)
    ///
    /// Ignored by the sequential backend and by wavefront-mpi, where the
    /// number of ranks is set by the MPI launcher.
    #[arg(short = 'j', long, env = "THREADS")]
    pub threads: Option<usize>,

    /// Maximal number of matrix cells bundled into one task
    #[arg(short, long, env = "GRANULARITY", default_value_t = 1)]
    pub granularity: usize,
}
//
impl SharedArgs {
    /// Validate the arguments and turn them into a run configuration
    pub fn config(&self) -> Result<Config, ConfigError> {
        let threads = self.threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });
        Config::new(self.matrix_size, threads, self.granularity)
    }
}

/// Set up logging to stderr, filtered through the `RUST_LOG` variable
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    log::debug!("Logging initialized");
}

/// Render the full matrix, lower triangle included, with two decimals per cell
pub fn format_matrix(matrix: &TriangularMatrix) -> String {
    let mut output = String::from("\n");
    for row in matrix.to_array().rows() {
        for cell in row {
            // Writing to a String cannot fail
            let _ = write!(output, "{cell:.2} ");
        }
        output.push('\n');
    }
    output.push('\n');
    output
}

/// Render a run duration as milliseconds with three decimals
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}", elapsed.as_secs_f64() * 1000.0)
}
