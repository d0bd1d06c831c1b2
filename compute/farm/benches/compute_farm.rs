compute::criterion_benchmark!(compute_farm::Farm);
