use clap::Parser;
use compute::{DotCbrt, RunContext};
use compute_selector::{Backend, Engine};
use eyre::{ensure, Result};
use ui::SharedArgs;

/// Fill in the upper triangle of a matrix, one diagonal at a time
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CLI arguments shared with the "wavefront-mpi" executable
    #[command(flatten)]
    shared: SharedArgs,

    /// Compute backend
    #[arg(short, long, value_enum, default_value_t)]
    backend: Backend,

    /// Print the final matrix
    #[arg(long)]
    print: bool,

    /// Check the result against the sequential backend
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    // Enable logging to stderr
    ui::init_logging();

    // Parse and validate CLI arguments
    let args = Args::parse();
    let config = args.shared.config()?;

    // Set up the backend, then run and time it
    let engine = Engine::new(args.backend, &config)?;
    let mut context = RunContext::new(config);
    let elapsed = context.execute(&engine, &DotCbrt)?;
    println!("{}", ui::format_elapsed(elapsed));

    if args.print {
        print!("{}", ui::format_matrix(context.matrix()));
    }

    if args.verify {
        log::info!("Verifying the {:?} backend's output", engine.backend());
        let reference_engine = Engine::new(Backend::Sequential, &config)?;
        let mut reference = RunContext::new(config);
        reference.execute(&reference_engine, &DotCbrt)?;
        ensure!(
            context.matrix().to_array() == reference.matrix().to_array(),
            "the {:?} backend disagrees with the sequential backend",
            engine.backend()
        );
    }
    Ok(())
}
