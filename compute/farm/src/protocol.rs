//! Messages and scheduling logic of the farm's feedback loop
//!
//! The coordinator is the only owner of the scheduling state (current diagonal
//! and completion count). Workers only learn about it through the tasks they
//! receive, and only affect it through the completion signals they send back.

use compute::partition::{tasks, Task, Tasks};
use data::diagonal_len;
use std::num::NonZeroUsize;
use thiserror::Error;

/// Message from the coordinator to the workers
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    /// Compute the cells of a task
    Task(Task),

    /// Stop processing tasks and exit
    Shutdown,
}

/// Message from a worker to the coordinator
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Feedback {
    /// One cell was computed and written
    Completed(Completion),

    /// The kernel panicked, the run cannot proceed
    Failed { diagonal: usize, message: String },
}

/// Signal that one cell of a diagonal was written
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Completion {
    /// Diagonal of the written cell
    pub diagonal: usize,
}

/// What the coordinator should do after an activation
#[derive(Clone, Debug)]
pub enum Action {
    /// Send these tasks to the workers, then wait for completions
    Dispatch(Tasks),

    /// Wait for more completions
    Wait,

    /// All diagonals were computed, shut the workers down
    Terminate,
}

/// Scheduling state machine of the farm coordinator
///
/// Diagonal `k` is dispatched exactly once, as soon as diagonal `k - 1` has
/// received one completion signal per cell. Completions are counted in cells
/// rather than tasks, so the task granularity does not affect when a diagonal
/// is considered done.
#[derive(Clone, Debug)]
pub struct Coordinator {
    /// Number of rows and columns of the matrix
    size: usize,

    /// Maximal number of cells per task
    granularity: NonZeroUsize,

    /// Diagonal currently being computed
    diagonal: usize,

    /// Number of cells of the current diagonal known to be written
    completed: usize,

    /// Truth that the current diagonal's tasks were sent out
    dispatched: bool,
}
//
impl Coordinator {
    /// Set up the coordinator of a `size`x`size` matrix computation
    pub fn new(size: usize, granularity: NonZeroUsize) -> Self {
        Self {
            size,
            granularity,
            diagonal: 1,
            completed: 0,
            dispatched: false,
        }
    }

    /// Diagonal currently being computed
    pub fn diagonal(&self) -> usize {
        self.diagonal
    }

    /// Number of cells of the current diagonal known to be written
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Truth that all diagonals have been computed
    pub fn is_finished(&self) -> bool {
        self.diagonal >= self.size
    }

    /// Process an activation, with an optional completion signal
    ///
    /// The first activation should carry no signal, and all subsequent
    /// activations should carry one completion signal from a worker.
    pub fn activate(&mut self, signal: Option<Completion>) -> Result<Action, ProtocolError> {
        if self.is_finished() {
            return match signal {
                None => Ok(Action::Terminate),
                Some(Completion { diagonal }) => Err(ProtocolError::AfterTermination { diagonal }),
            };
        }

        if let Some(Completion { diagonal }) = signal {
            if diagonal != self.diagonal || !self.dispatched {
                return Err(ProtocolError::UnexpectedCompletion {
                    expected: self.diagonal,
                    received: diagonal,
                });
            }
            self.completed += 1;
        }

        if self.completed == diagonal_len(self.size, self.diagonal) {
            self.completed = 0;
            self.diagonal += 1;
            self.dispatched = false;
            if self.is_finished() {
                return Ok(Action::Terminate);
            }
        }

        if self.dispatched {
            Ok(Action::Wait)
        } else {
            self.dispatched = true;
            Ok(Action::Dispatch(tasks(
                self.diagonal,
                self.size,
                self.granularity,
            )))
        }
    }
}

/// Violations of the farm protocol
#[derive(Copy, Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ProtocolError {
    /// Completion signal for a diagonal that is not being computed
    #[error("received completion for diagonal {received} while computing diagonal {expected}")]
    UnexpectedCompletion { expected: usize, received: usize },

    /// Completion signal after all diagonals were computed
    #[error("received completion for diagonal {diagonal} after termination")]
    AfterTermination { diagonal: usize },
}
