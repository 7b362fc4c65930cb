//! pointrank CLI - rank every point in a dataset by distance to a reference

use clap::Parser;
use pointrank::{Backend, DevicePreference, Pipeline, RankConfig, RankError, Result, RunSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pointrank")]
#[command(author, version, about = "Brute-force nearest-neighbour ranking on CPU or GPU", long_about = None)]
struct Cli {
    /// Dataset file: one point per line, whitespace-separated floats
    dataset: PathBuf,

    /// Ranking backend (cpu, gpu)
    backend: String,

    /// Reference point as comma-separated floats; missing components are zero
    #[arg(allow_hyphen_values = true)]
    reference: Option<String>,

    /// Worker threads (defaults to the available parallelism)
    #[arg(short, long, env = "POINTRANK_THREADS")]
    threads: Option<usize>,

    /// Device for the gpu backend (auto, host, cuda)
    #[arg(long, default_value = "auto")]
    device: String,

    /// Print the run summary as JSON instead of the timing report
    #[arg(long)]
    json: bool,
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
    let backend: Backend = cli.backend.parse()?;
    let device: DevicePreference = cli.device.parse()?;
    let workers = match cli.threads {
        Some(0) => {
            return Err(RankError::InvalidArgument(
                "--threads must be at least 1".into(),
            ))
        }
        Some(n) => n,
        None => std::thread::available_parallelism().map_or(1, |n| n.get()),
    };

    let config = RankConfig::builder()
        .workers(workers)
        .backend(backend)
        .device(device)
        .build();
    let summary = Pipeline::new(config)?.run(&cli.dataset, cli.reference.as_deref())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| RankError::InvalidState(format!("cannot serialize summary: {}", e)))?;
        println!("{}", json);
    } else {
        print_report(&summary);
    }
    Ok(())
}

fn print_timing(operation: &str, elapsed: Duration) {
    let seconds = elapsed.as_secs_f64();
    println!("{} Time: {:.6} ms ({:.6} s)", operation, seconds * 1000.0, seconds);
}

fn print_report(summary: &RunSummary) {
    let report = &summary.report;
    match &report.gpu {
        None => {
            println!();
            println!("--- Running CPU Backend ({} threads) ---", summary.workers);
            println!("N={}, D={}", summary.n, summary.dim);
            println!();
            println!("--- Detailed Operation Times ---");
            print_timing("Data Loading (mmap)", summary.load);
            print_timing("Distance Calculation", report.distance);
            print_timing("Sorting (Mergesort)", report.sort);
        }
        Some(gpu) => {
            println!();
            println!("--- Running GPU Backend ({}) ---", report.backend);
            println!("N={}, D={}", summary.n, summary.dim);
            println!();
            println!("--- Detailed Operation Times ---");
            print_timing("Data Loading (mmap)", summary.load);
            print_timing("Host Preparation", gpu.host_prep);
            print_timing("Alloc + H2D", gpu.transfer_in);
            print_timing("Distance Kernel", gpu.distance_kernel);
            print_timing("Sort Kernel", gpu.sort_network);
            print_timing("D2H", gpu.transfer_out);
            print_timing("Host Reorder", gpu.host_reorder);
        }
    }
    println!("------------------------------------");
    print_timing("Total Pipeline Time", summary.total());

    println!();
    println!("--- Result Check ---");
    if let (Some(closest), Some(farthest)) = (summary.closest, summary.farthest) {
        println!("Closest Distance: {:.6}", closest);
        println!("Farthest Distance: {:.6}", farthest);
    }
}
