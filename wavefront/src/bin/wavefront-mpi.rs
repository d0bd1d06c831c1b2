//! Wavefront computation with one MPI process per rank
//!
//! Start it through the MPI launcher, e.g. `mpirun -n 4 wavefront-mpi -n 1000`.

use clap::Parser;
use compute::{Config, DotCbrt};
use compute_collective::{communicator::Communicator, mpi::MpiCommunicator, run_rank};
use data::matrix::TriangularMatrix;
use eyre::{eyre, Result};
use std::time::Instant;
use ui::SharedArgs;

/// Fill in the upper triangle of a matrix, one diagonal at a time, across MPI
/// processes
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CLI arguments shared with the "wavefront" executable
    #[command(flatten)]
    shared: SharedArgs,

    /// Print the final matrix (from rank 0 only)
    #[arg(long)]
    print: bool,
}

fn main() -> Result<()> {
    // Enable logging to stderr
    ui::init_logging();

    // Parse CLI arguments and join the MPI job
    let args = Args::parse();
    let universe = mpi::initialize().ok_or_else(|| eyre!("MPI was already initialized"))?;
    let mut comm = MpiCommunicator::new(universe.world());
    let rank = comm.rank();

    // The number of ranks comes from the MPI launcher, not from --threads
    let config = Config::new(args.shared.matrix_size, comm.size(), args.shared.granularity)?;
    log::debug!("Rank {rank} of {} starting on {config:?}", config.workers);

    // Every rank computes on its own replica of the matrix
    let matrix = TriangularMatrix::new(config.size);
    let start = Instant::now();
    run_rank(&mut comm, &DotCbrt, &matrix)?;
    let elapsed = start.elapsed();

    if rank == 0 {
        println!("{}", ui::format_elapsed(elapsed));
        if args.print {
            print!("{}", ui::format_matrix(&matrix));
        }
    }
    Ok(())
}
