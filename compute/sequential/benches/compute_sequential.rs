compute::criterion_benchmark!(compute_sequential::Sequential);
