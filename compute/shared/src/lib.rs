//! Common facilities shared by all compute backends

#[cfg(feature = "criterion")]
pub mod benchmark;
pub mod check;
pub mod config;
pub mod context;
pub mod kernel;
pub mod partition;

pub use config::{Config, ConfigError};
pub use context::RunContext;
pub use kernel::{DotCbrt, Kernel};

use data::matrix::TriangularMatrix;

/// Commonalities between all wavefront compute backends
pub trait WavefrontBase {
    /// Error type used by the backend, both at setup and execution time
    type Error: std::error::Error + Send + Sync + 'static;
}

/// Wavefront backend construction
pub trait WavefrontCreate: WavefrontBase + Sized {
    /// Set up the backend
    ///
    /// Any resource that the backend needs (thread pool, communication
    /// channels...) should be acquired here, so that setup failures are
    /// reported before any diagonal is computed.
    fn new(config: &Config) -> Result<Self, Self::Error>;
}

/// Wavefront computation
pub trait Wavefront: WavefrontBase {
    /// Compute diagonals `1..matrix.size()` of a matrix whose main diagonal
    /// has already been initialized
    ///
    /// When this returns successfully, every cell of the upper triangle has
    /// been written, and each diagonal was fully written before any cell of
    /// the next diagonal was computed. On error, the contents of the diagonal
    /// that was being computed are unspecified.
    fn run<K: Kernel>(&self, kernel: &K, matrix: &TriangularMatrix) -> Result<(), Self::Error>;
}

/// Extract a human-readable message from a panic payload
///
/// Used by the parallel backends to report worker failures.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Macro that generates a complete criterion benchmark harness for you
#[macro_export]
#[cfg(feature = "criterion")]
macro_rules! criterion_benchmark {
    ($backend:ident :: $engine:ident) => {
        fn criterion_benchmark(c: &mut $crate::benchmark::criterion::Criterion) {
            $crate::benchmark::criterion_benchmark::<$backend::$engine>(
                c,
                stringify!($backend),
            )
        }
        $crate::benchmark::criterion::criterion_group!(benches, criterion_benchmark);
        $crate::benchmark::criterion::criterion_main!(benches);
    };
}
