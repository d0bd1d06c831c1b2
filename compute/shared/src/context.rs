//! State of a single wavefront run

use crate::{Config, Kernel, Wavefront};
use data::matrix::TriangularMatrix;
use std::time::{Duration, Instant};

/// Matrix and parameters of one wavefront run
///
/// Runs are fully independent from each other, so several of them can coexist
/// within a process, e.g. to compare the outputs of different backends.
#[derive(Debug)]
pub struct RunContext {
    /// Run parameters
    config: Config,

    /// Matrix being computed
    matrix: TriangularMatrix,
}
//
impl RunContext {
    /// Allocate and initialize the matrix of a run
    pub fn new(config: Config) -> Self {
        Self {
            matrix: TriangularMatrix::new(config.size),
            config,
        }
    }

    /// Run parameters
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current matrix contents
    pub fn matrix(&self) -> &TriangularMatrix {
        &self.matrix
    }

    /// Give up the run state, keeping only the matrix
    pub fn into_matrix(self) -> TriangularMatrix {
        self.matrix
    }

    /// Run the wavefront computation, measuring its wall-clock duration
    ///
    /// Only the diagonal computations are timed, matrix initialization and
    /// backend setup are not.
    pub fn execute<B: Wavefront, K: Kernel>(
        &mut self,
        backend: &B,
        kernel: &K,
    ) -> Result<Duration, B::Error> {
        let start = Instant::now();
        backend.run(kernel, &self.matrix)?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DotCbrt, WavefrontBase};
    use std::convert::Infallible;

    /// Minimal backend that only computes the first diagonal
    struct FirstDiagonal;
    //
    impl WavefrontBase for FirstDiagonal {
        type Error = Infallible;
    }
    //
    impl Wavefront for FirstDiagonal {
        fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Infallible> {
            if matrix.size() > 1 {
                crate::kernel::compute_rows(kernel, 1, 0..matrix.size() - 1, matrix);
            }
            Ok(())
        }
    }

    #[test]
    fn contexts_are_independent() {
        let config = Config::new(2, 1, 1).unwrap();
        let mut ran = RunContext::new(config);
        let idle = RunContext::new(config);
        ran.execute(&FirstDiagonal, &DotCbrt).unwrap();
        assert_eq!(ran.matrix().read(0, 1), 0.5f64.cbrt());
        assert_eq!(idle.matrix().read(0, 1), 0.0);
        assert_eq!(ran.config(), idle.config());
        assert_eq!(ran.into_matrix().size(), 2);
    }
}
