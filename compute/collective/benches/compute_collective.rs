compute::criterion_benchmark!(compute_collective::Collective);
