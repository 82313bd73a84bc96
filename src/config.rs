//! Configuration for nvlog
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{NvlogError, Result};

/// Main configuration for a LogManager instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Log File Configuration
    // -------------------------------------------------------------------------
    /// Full path of the log file
    pub log_path: PathBuf,

    /// Which durability protocol the log implements
    pub strategy: LoggingStrategy,

    // -------------------------------------------------------------------------
    // Commit / Flush Configuration
    // -------------------------------------------------------------------------
    /// Whether commits wait for their record to become durable
    pub commit_mode: CommitMode,

    /// When the frontend logger flushes buffered records
    pub flush_policy: FlushPolicy,

    /// Emulated persistent-memory latencies
    pub latency_model: LatencyModel,
}

/// Logging protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoggingStrategy {
    /// Log full after-images before they become durable; replay rebuilds tables
    WriteAhead,

    /// Tables are durable in place; the log only records commit outcomes
    WriteBehind,
}

impl LoggingStrategy {
    /// Tag stored in the log file header
    pub fn tag(self) -> u8 {
        match self {
            LoggingStrategy::WriteAhead => 1,
            LoggingStrategy::WriteBehind => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(LoggingStrategy::WriteAhead),
            2 => Ok(LoggingStrategy::WriteBehind),
            other => Err(NvlogError::Configuration(format!(
                "unknown logging strategy tag: {}",
                other
            ))),
        }
    }

    /// Whether data records carry payloads into the log
    pub fn logs_payloads(self) -> bool {
        matches!(self, LoggingStrategy::WriteAhead)
    }
}

impl FromStr for LoggingStrategy {
    type Err = NvlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wal" | "write-ahead" | "write_ahead" => Ok(LoggingStrategy::WriteAhead),
            "wbl" | "write-behind" | "write_behind" => Ok(LoggingStrategy::WriteBehind),
            other => Err(NvlogError::Configuration(format!(
                "unknown logging strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for LoggingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingStrategy::WriteAhead => write!(f, "wal"),
            LoggingStrategy::WriteBehind => write!(f, "wbl"),
        }
    }
}

/// Commit acknowledgement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Commit returns once the commit record is durable
    Synchronous,

    /// Commit returns after handing the record to the backend buffer
    Asynchronous,
}

impl FromStr for CommitMode {
    type Err = NvlogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(CommitMode::Synchronous),
            "async" | "asynchronous" => Ok(CommitMode::Asynchronous),
            other => Err(NvlogError::Configuration(format!(
                "unknown commit mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitMode::Synchronous => write!(f, "sync"),
            CommitMode::Asynchronous => write!(f, "async"),
        }
    }
}

/// Flush trigger: whichever threshold is reached first wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Maximum time between flushes
    pub period: Duration,

    /// Flush once this many encoded bytes are buffered across all backends
    pub max_buffered_bytes: usize,

    /// Flush once this many records are buffered across all backends
    pub max_buffered_records: usize,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            max_buffered_bytes: 4 * 1024 * 1024, // 4 MB
            max_buffered_records: 64 * 1024,
        }
    }
}

/// Emulated persistent-memory latencies, injected on every flush boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyModel {
    /// Delay before every durable batch write (NVM write latency)
    pub per_flush_delay: Duration,

    /// Delay after every durable batch write (persistent commit cost)
    pub per_commit_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./nvlog_data/nvlog.log"),
            strategy: LoggingStrategy::WriteAhead,
            commit_mode: CommitMode::Synchronous,
            flush_policy: FlushPolicy::default(),
            latency_model: LatencyModel::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before any log I/O happens
    pub fn validate(&self) -> Result<()> {
        validate_log_path(&self.log_path)?;

        if self.flush_policy.period.is_zero() {
            return Err(NvlogError::Configuration(
                "flush period must be non-zero".to_string(),
            ));
        }
        if self.flush_policy.max_buffered_bytes == 0 || self.flush_policy.max_buffered_records == 0 {
            return Err(NvlogError::Configuration(
                "flush thresholds must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// A log path must name a file inside an existing directory
pub(crate) fn validate_log_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(NvlogError::Configuration("log path is empty".to_string()));
    }
    if path.is_dir() {
        return Err(NvlogError::Configuration(format!(
            "log path is a directory: {}",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(NvlogError::Configuration(format!(
                "log directory does not exist: {}",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the logging strategy
    pub fn strategy(mut self, strategy: LoggingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the commit mode
    pub fn commit_mode(mut self, mode: CommitMode) -> Self {
        self.config.commit_mode = mode;
        self
    }

    /// Set the flush period
    pub fn flush_period(mut self, period: Duration) -> Self {
        self.config.flush_policy.period = period;
        self
    }

    /// Set the buffered-bytes flush threshold
    pub fn max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.config.flush_policy.max_buffered_bytes = bytes;
        self
    }

    /// Set the buffered-records flush threshold
    pub fn max_buffered_records(mut self, records: usize) -> Self {
        self.config.flush_policy.max_buffered_records = records;
        self
    }

    /// Set the emulated NVM write latency
    pub fn per_flush_delay(mut self, delay: Duration) -> Self {
        self.config.latency_model.per_flush_delay = delay;
        self
    }

    /// Set the emulated persistent commit latency
    pub fn per_commit_delay(mut self, delay: Duration) -> Self {
        self.config.latency_model.per_commit_delay = delay;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
