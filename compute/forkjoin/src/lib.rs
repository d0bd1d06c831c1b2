//! Fork-join implementation of the wavefront computation
//!
//! Each diagonal is a parallel region: its rows are split into chunks of
//! `granularity` cells, which are statically dealt out to the threads of a
//! dedicated pool in round-robin fashion. All threads must be done with their
//! chunks before the next diagonal starts, which is what makes earlier
//! diagonals safe to read.

use compute::{
    kernel::compute_rows, panic_message, partition::split, Config, Kernel, Wavefront,
    WavefrontBase, WavefrontCreate,
};
use data::{diagonal_len, matrix::TriangularMatrix};
use log::{debug, trace};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
};
use thiserror::Error;

/// Static fork-join wavefront backend
#[derive(Debug)]
pub struct ForkJoin {
    /// Worker threads
    pool: ThreadPool,

    /// Maximal number of cells per chunk
    granularity: NonZeroUsize,
}
//
impl WavefrontBase for ForkJoin {
    type Error = Error;
}
//
impl WavefrontCreate for ForkJoin {
    fn new(config: &Config) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.get())
            .thread_name(|idx| format!("forkjoin-{idx}"))
            .build()
            .map_err(Error::ThreadPool)?;
        debug!(
            "Set up fork-join backend with {} threads and {}-cell chunks",
            pool.current_num_threads(),
            config.granularity
        );
        Ok(Self {
            pool,
            granularity: config.granularity,
        })
    }
}
//
impl Wavefront for ForkJoin {
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Error> {
        let size = matrix.size();
        for k in 1..size {
            let len = diagonal_len(size, k);
            trace!("Computing diagonal {k} ({len} cells)");

            // broadcast() runs the closure once on every pool thread and only
            // returns once all of them are done, which acts as our barrier
            panic::catch_unwind(AssertUnwindSafe(|| {
                self.pool.broadcast(|ctx| {
                    for rows in split(len, self.granularity)
                        .skip(ctx.index())
                        .step_by(ctx.num_threads())
                    {
                        compute_rows(kernel, k, rows, matrix);
                    }
                })
            }))
            .map_err(|payload| Error::WorkerPanicked {
                diagonal: k,
                message: panic_message(&*payload),
            })?;
        }
        Ok(())
    }
}

/// Things that can go wrong when running the fork-join backend
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to set up the thread pool
    #[error("failed to configure thread pool")]
    ThreadPool(#[source] ThreadPoolBuildError),

    /// A worker panicked while computing a diagonal
    #[error("worker panicked while computing diagonal {diagonal}: {message}")]
    WorkerPanicked { diagonal: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute::{check::OrderCheck, DotCbrt, RunContext};
    use compute_sequential::Sequential;
    use proptest::prelude::*;
    use std::sync::Once;

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    fn run_both(size: usize, workers: usize, granularity: usize) -> [TriangularMatrix; 2] {
        init_logger();
        let config = Config::new(size, workers, granularity).unwrap();

        let mut reference = RunContext::new(config);
        reference.execute(&Sequential, &DotCbrt).unwrap();

        let mut context = RunContext::new(config);
        let backend = ForkJoin::new(&config).unwrap();
        let check = OrderCheck::new(DotCbrt, size);
        context.execute(&backend, &check).unwrap();
        assert!(check.is_complete());

        [reference.into_matrix(), context.into_matrix()]
    }

    #[test]
    fn matches_sequential() {
        let [expected, actual] = run_both(4, 2, 1);
        assert_eq!(actual.to_array(), expected.to_array());
    }

    #[test]
    fn single_cell() {
        let [_, actual] = run_both(1, 3, 1);
        assert_eq!(actual.diagonal(0), vec![1.0]);
    }

    #[test]
    fn coarse_granularity() {
        let [expected, actual] = run_both(17, 4, 17);
        assert_eq!(actual.to_array(), expected.to_array());
        let [expected, actual] = run_both(17, 4, 1000);
        assert_eq!(actual.to_array(), expected.to_array());
    }

    #[test]
    fn more_workers_than_cells() {
        let [expected, actual] = run_both(5, 16, 1);
        assert_eq!(actual.to_array(), expected.to_array());
    }

    #[test]
    fn kernel_panic_aborts_run() {
        init_logger();
        let config = Config::new(8, 2, 2).unwrap();
        let backend = ForkJoin::new(&config).unwrap();
        let mut context = RunContext::new(config);
        let kernel = |m: usize, k: usize, _: &TriangularMatrix| {
            assert!(k < 3, "diagonal {k} row {m} is forbidden");
            1.0
        };
        match context.execute(&backend, &kernel) {
            Err(Error::WorkerPanicked { diagonal, message }) => {
                assert_eq!(diagonal, 3);
                assert!(message.contains("is forbidden"));
            }
            other => panic!("unexpected run outcome {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn equivalence(size in 1usize..40, workers in 1usize..6, granularity in 1usize..50) {
            let [expected, actual] = run_both(size, workers, granularity);
            prop_assert_eq!(actual.to_array(), expected.to_array());
        }
    }
}
