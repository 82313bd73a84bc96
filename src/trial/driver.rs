//! Trial driver
//!
//! Walks a LogManager through one full lifecycle and turns the outcome
//! into the experiment's number.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::{Config, LoggingStrategy};
use crate::error::Result;
use crate::logging::{FlushStatsSnapshot, LogManager, LoggingMode};
use crate::recovery::RecoveryStats;
use crate::storage::{Storage, TableStore};

use super::workload::{Workload, WorkloadStats};
use super::{ExperimentType, TrialConfig};

/// Outcome of one trial
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub experiment: ExperimentType,

    /// The experiment's headline number
    pub value: f64,

    /// Timed-phase counters; empty for recovery trials
    pub workload: WorkloadStats,

    pub recovery: Option<RecoveryStats>,
    pub recovery_time: Duration,

    /// Load, timed phase and end of logging; the throughput denominator
    pub build_time: Duration,
    pub log_size: u64,
    pub flush: FlushStatsSnapshot,
    pub page_flushes: u64,
}

impl TrialResult {
    /// Committed transactions per second of the timed phase
    pub fn txn_per_sec(&self) -> f64 {
        let secs = self.workload.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.workload.committed as f64 / secs
    }

    /// One-line summary, parameters first, value after `::`
    pub fn summary_line(&self, trial: &TrialConfig, log: &Config) -> String {
        format!(
            "{} {} {:.2} {} {} {} {} {} {} {} :: {:.6}",
            self.experiment,
            log.strategy,
            trial.update_ratio,
            trial.scale_factor,
            trial.backend_count,
            trial.duration.as_secs_f64(),
            log.latency_model.per_flush_delay.as_micros(),
            log.latency_model.per_commit_delay.as_micros(),
            log.flush_policy.period.as_millis(),
            log.commit_mode,
            self.value
        )
    }
}

/// Image file a write-behind trial persists its tables to
pub fn table_image_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("tables")
}

/// Run one trial.
///
/// Recovery trials replay whatever log (and table image) already exists at
/// `log.log_path`. Every other experiment starts from an empty log.
pub fn run_trial(trial: &TrialConfig, log: &Config) -> Result<TrialResult> {
    trial.validate()?;
    log.validate()?;

    let image_path = table_image_path(&log.log_path);
    if trial.experiment != ExperimentType::Recovery {
        remove_if_exists(&log.log_path)?;
        remove_if_exists(&image_path)?;
    }

    let storage: Arc<dyn Storage> = match log.strategy {
        LoggingStrategy::WriteAhead => Arc::new(TableStore::new()),
        LoggingStrategy::WriteBehind => Arc::new(TableStore::persistent(&image_path)?),
    };
    let manager = LogManager::new(log.clone(), Arc::clone(&storage))?;

    info!(
        experiment = %trial.experiment,
        strategy = %log.strategy,
        backends = trial.backend_count,
        "starting trial"
    );

    manager.start_standby_mode()?;
    manager.wait_for_mode_transition(LoggingMode::Standby, true)?;
    manager.prepare_recovery()?;

    let recovery_started = Instant::now();
    manager.start_recovery_mode()?;
    manager.wait_for_mode_transition(LoggingMode::Logging, true)?;
    let recovery_time = recovery_started.elapsed();

    let build_started = Instant::now();
    let workload_stats = if trial.experiment == ExperimentType::Recovery {
        WorkloadStats::default()
    } else {
        let mut workload = Workload::new(&manager, trial.clone());
        workload.load()?;
        workload.run()?
    };

    manager.end_logging()?;
    let build_time = build_started.elapsed();
    manager.wait_for_mode_transition(LoggingMode::Sleeping, true)?;

    let flush = manager.flush_stats();
    let log_size = manager.log_file_size()?;
    let value = match trial.experiment {
        ExperimentType::Throughput => {
            normalized_throughput(trial.duration, trial.backend_count, build_time)
        }
        ExperimentType::Storage => log_size as f64,
        ExperimentType::Latency => flush.mean_latency().as_secs_f64() * 1_000_000.0,
        ExperimentType::Recovery => recovery_time.as_secs_f64() * 1000.0,
    };

    let result = TrialResult {
        experiment: trial.experiment,
        value,
        workload: workload_stats,
        recovery: manager.recovery_stats(),
        recovery_time,
        build_time,
        log_size,
        flush,
        page_flushes: storage.page_flush_count(),
    };

    manager.reset_log_status()?;
    manager.reset_frontend_loggers()?;

    info!(experiment = %trial.experiment, value = result.value, "trial finished");
    Ok(result)
}

/// `duration × backends ÷ wall time`
fn normalized_throughput(duration: Duration, backend_count: usize, wall: Duration) -> f64 {
    let wall = wall.as_secs_f64();
    if wall == 0.0 {
        return 0.0;
    }
    duration.as_secs_f64() * backend_count as f64 / wall
}

/// Append `line` to the summary file
pub fn append_summary(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
