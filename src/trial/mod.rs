//! Trial Module
//!
//! Benchmark harness over the public LogManager surface: load a table,
//! run update-or-read workers for a fixed duration, tear down, and report
//! one number per experiment.

mod driver;
mod workload;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{NvlogError, Result};

pub use driver::{append_summary, run_trial, table_image_path, TrialResult};
pub use workload::{build_row, row_schema, Workload, WorkloadStats, TABLE_ID};

/// What a trial measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentType {
    /// Normalized throughput of the workload phase
    Throughput,
    /// Log file size after the trial, in bytes
    Storage,
    /// Mean flush latency, in microseconds
    Latency,
    /// Recovery time against an existing log, in milliseconds
    Recovery,
}

impl FromStr for ExperimentType {
    type Err = NvlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "throughput" => Ok(ExperimentType::Throughput),
            "storage" => Ok(ExperimentType::Storage),
            "latency" => Ok(ExperimentType::Latency),
            "recovery" => Ok(ExperimentType::Recovery),
            other => Err(NvlogError::Configuration(format!(
                "unknown experiment type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExperimentType::Throughput => "throughput",
            ExperimentType::Storage => "storage",
            ExperimentType::Latency => "latency",
            ExperimentType::Recovery => "recovery",
        };
        write!(f, "{}", name)
    }
}

/// Workload parameters of one trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    /// Tuples loaded before the timed phase
    pub scale_factor: usize,
    /// Columns per tuple, key column included
    pub column_count: usize,
    /// Fraction of transactions that update, the rest only read
    pub update_ratio: f64,
    /// Worker threads, one backend logger each
    pub backend_count: usize,
    pub duration: Duration,
    pub experiment: ExperimentType,
    pub seed: u64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1000,
            column_count: 10,
            update_ratio: 1.0,
            backend_count: 1,
            duration: Duration::from_secs(1),
            experiment: ExperimentType::Throughput,
            seed: 0,
        }
    }
}

impl TrialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scale_factor == 0 {
            return Err(NvlogError::Configuration(
                "scale_factor must be positive".to_string(),
            ));
        }
        if self.column_count == 0 {
            return Err(NvlogError::Configuration(
                "column_count must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.update_ratio) {
            return Err(NvlogError::Configuration(format!(
                "update_ratio must be within [0, 1], got {}",
                self.update_ratio
            )));
        }
        if self.backend_count == 0 {
            return Err(NvlogError::Configuration(
                "backend_count must be positive".to_string(),
            ));
        }
        if self.duration.is_zero() {
            return Err(NvlogError::Configuration(
                "duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
