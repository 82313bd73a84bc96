//! nvlog Benchmark Binary
//!
//! Runs one logging trial and appends its summary line to a file.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use nvlog::config::{CommitMode, Config, LoggingStrategy};
use nvlog::trial::{append_summary, run_trial, ExperimentType, TrialConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// nvlog trial runner
#[derive(Parser, Debug)]
#[command(name = "nvlog-bench")]
#[command(about = "Measure write-ahead / write-behind logging")]
#[command(version)]
struct Args {
    /// Log file path
    #[arg(short = 'f', long, default_value = "./nvlog_data/nvlog.log")]
    log_file: PathBuf,

    /// Logging strategy: wal or wbl
    #[arg(short, long, default_value = "wal")]
    strategy: LoggingStrategy,

    /// Commit mode: sync or async
    #[arg(short, long, default_value = "sync")]
    commit_mode: CommitMode,

    /// Experiment: throughput, storage, latency or recovery
    #[arg(short, long, default_value = "throughput")]
    experiment: ExperimentType,

    /// Tuples loaded before the timed phase
    #[arg(short = 'k', long, default_value = "1000")]
    scale_factor: usize,

    /// Columns per tuple
    #[arg(long, default_value = "10")]
    column_count: usize,

    /// Fraction of update transactions
    #[arg(short, long, default_value = "1.0")]
    update_ratio: f64,

    /// Worker threads
    #[arg(short, long, default_value = "1")]
    backend_count: usize,

    /// Timed phase length in seconds
    #[arg(short, long, default_value = "1.0")]
    duration: f64,

    /// Flush period in milliseconds
    #[arg(long, default_value = "10")]
    flush_period_ms: u64,

    /// Emulated per-flush latency in microseconds
    #[arg(long, default_value = "0")]
    flush_delay_us: u64,

    /// Emulated per-commit latency in microseconds
    #[arg(long, default_value = "0")]
    commit_delay_us: u64,

    /// Workload seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Summary file the result line is appended to
    #[arg(short, long, default_value = "outputfile.summary")]
    output: PathBuf,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nvlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("nvlog bench v{}", nvlog::VERSION);

    if !args.duration.is_finite() || args.duration <= 0.0 {
        tracing::error!("duration must be a positive number of seconds");
        process::exit(2);
    }

    if let Some(parent) = args.log_file.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create log directory: {}", e);
                process::exit(1);
            }
        }
    }

    let log_config = Config::builder()
        .log_path(&args.log_file)
        .strategy(args.strategy)
        .commit_mode(args.commit_mode)
        .flush_period(Duration::from_millis(args.flush_period_ms))
        .per_flush_delay(Duration::from_micros(args.flush_delay_us))
        .per_commit_delay(Duration::from_micros(args.commit_delay_us))
        .build();

    let trial = TrialConfig {
        scale_factor: args.scale_factor,
        column_count: args.column_count,
        update_ratio: args.update_ratio,
        backend_count: args.backend_count,
        duration: Duration::from_secs_f64(args.duration),
        experiment: args.experiment,
        seed: args.seed,
    };

    let result = match run_trial(&trial, &log_config) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Trial failed: {}", e);
            process::exit(1);
        }
    };

    tracing::info!(
        committed = result.workload.committed,
        txn_per_sec = result.txn_per_sec(),
        log_size = result.log_size,
        flushes = result.flush.flushes,
        page_flushes = result.page_flushes,
        "trial complete"
    );

    let line = result.summary_line(&trial, &log_config);
    println!("{}", line);

    if let Err(e) = append_summary(&args.output, &line) {
        tracing::error!("Failed to write summary: {}", e);
        process::exit(1);
    }
}
