//! pointgen CLI - write a synthetic dataset for pointrank

use clap::Parser;
use pointrank::generator::{generate_dataset, GeneratorConfig};
use pointrank::{RankError, Result};
use rand::Rng;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pointgen")]
#[command(author, version, about = "Generate uniformly random points in [-1000, 1000]", long_about = None)]
struct Cli {
    /// Number of points to write
    points: u64,

    /// Coordinates per point
    dims: usize,

    /// Output file (truncated if it exists)
    output: PathBuf,

    /// Base RNG seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Writer threads (defaults to the available parallelism)
    #[arg(short, long, env = "POINTRANK_THREADS")]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let workers = cli
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
    let seed = cli.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let config = GeneratorConfig::new(cli.points, cli.dims, seed, workers);
    config.validate()?;

    println!("Generator config:");
    println!(" - Threads:    {}", config.workers);
    println!(" - Dimensions: {}", config.dims);
    println!(" - Batch Size: {} points per write", config.batch_rows);
    println!(" - Seed:       {}", config.seed);
    println!("-------------------------------------------");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| RankError::InvalidConfig(format!("cannot build worker pool: {}", e)))?;
    let report = pool.install(|| generate_dataset(&cli.output, &config))?;

    println!();
    println!(
        "Generation finished in {:.3}s ({} points, {} bytes)",
        report.elapsed.as_secs_f64(),
        report.rows,
        report.bytes
    );
    Ok(())
}
