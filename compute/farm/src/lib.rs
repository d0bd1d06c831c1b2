//! Task farm implementation of the wavefront computation
//!
//! A coordinator (the thread that calls [`Wavefront::run()`]) and a pool of
//! worker threads are connected by two channels forming a closed loop. The
//! coordinator sends out the tasks of a diagonal, workers compute them and
//! send back one completion signal per written cell, and once every cell of
//! the diagonal has been accounted for, the coordinator sends out the tasks of
//! the next diagonal. There is no barrier: idle workers simply block on the
//! task channel until the coordinator reacts.
//!
//! The scheduling logic lives in the [`protocol`] module, this module only
//! deals with threads and channels.

pub mod protocol;

use crate::protocol::{Action, Completion, Coordinator, Dispatch, Feedback, ProtocolError};
use compute::{
    panic_message,
    partition::{max_tasks_per_diagonal, Task},
    Config, Kernel, Wavefront, WavefrontBase, WavefrontCreate,
};
use crossbeam_channel::{Receiver, Sender};
use data::matrix::TriangularMatrix;
use log::{debug, trace};
use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    thread,
};
use thiserror::Error;

/// Task farm wavefront backend
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Farm {
    /// Number of worker threads
    workers: NonZeroUsize,

    /// Maximal number of cells per task
    granularity: NonZeroUsize,
}
//
impl WavefrontBase for Farm {
    type Error = Error;
}
//
impl WavefrontCreate for Farm {
    fn new(config: &Config) -> Result<Self, Error> {
        debug!(
            "Set up farm backend with {} workers and {}-cell tasks",
            config.workers, config.granularity
        );
        Ok(Self {
            workers: config.workers,
            granularity: config.granularity,
        })
    }
}
//
impl Wavefront for Farm {
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Error> {
        let size = matrix.size();
        let num_workers = self.workers.get();
        thread::scope(|s| {
            // The task channel can hold a whole diagonal plus the shutdown
            // messages, and the feedback channel can hold one signal per cell
            // of a diagonal, so neither end ever blocks on a full channel.
            let task_capacity = max_tasks_per_diagonal(size, self.granularity) + num_workers;
            let (task_sender, task_receiver) = crossbeam_channel::bounded(task_capacity);
            let (feedback_sender, feedback_receiver) = crossbeam_channel::bounded(size.max(1));

            // Spawn the workers. On error, returning drops task_sender, which
            // makes the workers that were already spawned exit.
            let mut workers = Vec::with_capacity(num_workers);
            for idx in 0..num_workers {
                let tasks = task_receiver.clone();
                let feedback = feedback_sender.clone();
                let worker = thread::Builder::new()
                    .name(format!("farm-worker-{idx}"))
                    .spawn_scoped(s, move || work(kernel, matrix, tasks, feedback))
                    .map_err(Error::Spawn)?;
                workers.push(worker);
            }
            drop((task_receiver, feedback_sender));

            // Run the coordinator on this thread
            let mut coordinator = Coordinator::new(size, self.granularity);
            let mut outcome = coordinate(&mut coordinator, &task_sender, &feedback_receiver);
            if outcome.is_ok() {
                for _ in 0..num_workers {
                    if task_sender.send(Dispatch::Shutdown).is_err() {
                        outcome = Err(Error::Disconnected);
                        break;
                    }
                }
            }

            // Hang up so that workers exit even if the run was aborted
            drop((task_sender, feedback_receiver));
            for worker in workers {
                if worker.join().is_err() {
                    outcome = outcome.and(Err(Error::Disconnected));
                }
            }
            outcome
        })
    }
}

/// Coordinator side of the feedback loop
fn coordinate(
    coordinator: &mut Coordinator,
    tasks: &Sender<Dispatch>,
    feedback: &Receiver<Feedback>,
) -> Result<(), Error> {
    let mut action = coordinator.activate(None)?;
    loop {
        match action {
            Action::Dispatch(batch) => {
                trace!(
                    "Dispatching {} tasks for diagonal {}",
                    batch.len(),
                    coordinator.diagonal()
                );
                for task in batch {
                    tasks
                        .send(Dispatch::Task(task))
                        .map_err(|_| Error::Disconnected)?;
                }
            }
            Action::Wait => {}
            Action::Terminate => return Ok(()),
        }
        action = match feedback.recv().map_err(|_| Error::Disconnected)? {
            Feedback::Completed(completion) => coordinator.activate(Some(completion))?,
            Feedback::Failed { diagonal, message } => {
                return Err(Error::WorkerPanicked { diagonal, message })
            }
        };
    }
}

/// Worker side of the feedback loop
fn work<K: Kernel>(
    kernel: &K,
    matrix: &TriangularMatrix,
    tasks: Receiver<Dispatch>,
    feedback: Sender<Feedback>,
) {
    for message in tasks {
        let Task { diagonal, rows } = match message {
            Dispatch::Task(task) => task,
            Dispatch::Shutdown => return,
        };
        for m in rows {
            let signal =
                match panic::catch_unwind(AssertUnwindSafe(|| kernel.compute(m, diagonal, matrix))) {
                    Ok(value) => {
                        matrix.write(m, m + diagonal, value);
                        Feedback::Completed(Completion { diagonal })
                    }
                    Err(payload) => Feedback::Failed {
                        diagonal,
                        message: panic_message(&*payload),
                    },
                };
            let failed = matches!(signal, Feedback::Failed { .. });
            if feedback.send(signal).is_err() || failed {
                return;
            }
        }
    }
}

/// Things that can go wrong when running the farm backend
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to spawn a worker thread
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),

    /// The feedback loop was broken
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A worker panicked while computing a diagonal
    #[error("worker panicked while computing diagonal {diagonal}: {message}")]
    WorkerPanicked { diagonal: usize, message: String },

    /// A worker or the coordinator hung up unexpectedly
    #[error("farm channel disconnected unexpectedly")]
    Disconnected,
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
        let backend = Farm::new(&config).unwrap();
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
    fn two_by_two() {
        let [_, actual] = run_both(2, 2, 1);
        assert_eq!(actual.diagonal(0), vec![0.5, 1.0]);
        assert_eq!(actual.read(0, 1), 0.5f64.cbrt());
    }

    #[test]
    fn single_cell() {
        let [_, actual] = run_both(1, 4, 1);
        assert_eq!(actual.to_array(), ndarray::array![[1.0]]);
    }

    #[test]
    fn coarse_granularity() {
        let [expected, actual] = run_both(20, 3, 20);
        assert_eq!(actual.to_array(), expected.to_array());
        let [expected, actual] = run_both(20, 3, 64);
        assert_eq!(actual.to_array(), expected.to_array());
    }

    #[test]
    fn single_worker() {
        let [expected, actual] = run_both(25, 1, 4);
        assert_eq!(actual.to_array(), expected.to_array());
    }

    #[test]
    fn kernel_panic_aborts_run() {
        init_logger();
        let config = Config::new(10, 3, 2).unwrap();
        let backend = Farm::new(&config).unwrap();
        let mut context = RunContext::new(config);
        let kernel = |m: usize, k: usize, _: &TriangularMatrix| {
            assert!(k != 4 || m != 3, "cell ({m}, {}) is forbidden", m + k);
            1.0
        };
        match context.execute(&backend, &kernel) {
            Err(Error::WorkerPanicked { diagonal, message }) => {
                assert_eq!(diagonal, 4);
                assert!(message.contains("(3, 7) is forbidden"));
            }
            other => panic!("unexpected run outcome {other:?}"),
        }
    }

    #[test]
    fn backend_is_reusable() {
        let config = Config::new(12, 2, 3).unwrap();
        let backend = Farm::new(&config).unwrap();
        let mut first = RunContext::new(config);
        let mut second = RunContext::new(config);
        first.execute(&backend, &DotCbrt).unwrap();
        second.execute(&backend, &DotCbrt).unwrap();
        assert_eq!(first.matrix().to_array(), second.matrix().to_array());
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
