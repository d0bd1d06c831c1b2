//! Benchmarking utilities
//!
//! Please consider using the [`criterion_benchmark!`](crate::criterion_benchmark)
//! macro instead of calling these implementation details directly.

use crate::{Config, DotCbrt, RunContext, Wavefront, WavefrontCreate};
use criterion::{BenchmarkId, Criterion, Throughput};
use std::{hint::black_box, sync::Once};

/// Re-export criterion for the criterion_benchmark macro
pub use criterion;

// Make sure env_logger is only initialized once
fn init_logger() {
    static INIT_LOGGER: Once = Once::new();
    INIT_LOGGER.call_once(env_logger::init);
}

/// Common criterion benchmark for all wavefront backends
pub fn criterion_benchmark<Backend: Wavefront + WavefrontCreate>(
    c: &mut Criterion,
    backend_name: &str,
) {
    init_logger();

    let workers = std::thread::available_parallelism().map_or(1, usize::from);
    let mut group = c.benchmark_group(backend_name.to_owned());
    for size_pow2 in 4..=10 {
        let size = 2usize.pow(size_pow2);
        for granularity in [1, 16, 256] {
            let config = Config::new(black_box(size), workers, granularity)
                .expect("Benchmark configuration should be valid");
            let backend = Backend::new(&config).expect("Failed to set up backend");
            let mut context = RunContext::new(config);

            // The kernel reads k cells pairs for each of the size - k cells of
            // diagonal k, for a total of ~size^3/6 multiply-adds
            let num_ops = (size * size * size / 6) as u64;
            group.throughput(Throughput::Elements(num_ops));
            group.bench_function(
                BenchmarkId::from_parameter(format!("{size}x{size},grain{granularity}")),
                |b| {
                    b.iter(|| {
                        context
                            .execute(&backend, &DotCbrt)
                            .expect("Wavefront run failed")
                    });
                },
            );
            black_box(context);
        }
    }
    group.finish();
}
