//! Log Manager
//!
//! Owns the lifecycle: spawning the frontend logger, recovery, handing out
//! backend loggers, and the orderly shutdown that drains every buffer
//! before the log is declared closed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{validate_log_path, CommitMode, Config, LoggingStrategy};
use crate::error::{NvlogError, Result};
use crate::logfile::Lsn;
use crate::recovery::RecoveryStats;
use crate::storage::Storage;

use super::backend::BackendLogger;
use super::cancel::CancellationToken;
use super::frontend::{FrontendCommand, FrontendHandle, FrontendLogger, FrontendShared};
use super::mode::{LoggingMode, ModeMonitor};
use super::stats::FlushStatsSnapshot;

struct ManagerInner {
    config: Config,
    frontend: Option<FrontendHandle>,

    /// Kept after shutdown so stats stay readable until the next reset
    last_frontend: Option<Arc<FrontendShared>>,

    /// Set by prepare_recovery, consumed by start_recovery_mode
    prepared: bool,
}

/// Entry point for logging and recovery
pub struct LogManager {
    storage: Arc<dyn Storage>,
    monitor: Arc<ModeMonitor>,
    inner: Mutex<ManagerInner>,
}

impl LogManager {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            monitor: Arc::new(ModeMonitor::new()),
            inner: Mutex::new(ManagerInner {
                config,
                frontend: None,
                last_frontend: None,
                prepared: false,
            }),
        })
    }

    /// Point the manager at a different log file. Only allowed in Invalid.
    pub fn set_log_file_name(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let mut inner = self.inner.lock();
        let mode = self.monitor.mode();
        if mode != LoggingMode::Invalid {
            return Err(NvlogError::Sequencing(format!(
                "cannot change the log file in mode {}",
                mode
            )));
        }
        validate_log_path(&path)?;
        inner.config.log_path = path;
        Ok(())
    }

    /// Open the log file and start the frontend logger
    pub fn start_standby_mode(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.frontend.is_some() {
            return Err(NvlogError::DoubleRegistration);
        }
        let mode = self.monitor.mode();
        if mode != LoggingMode::Invalid {
            return Err(NvlogError::Sequencing(format!(
                "cannot enter standby from {}",
                mode
            )));
        }

        let handle = FrontendLogger::spawn(&inner.config, Arc::clone(&self.storage), Arc::clone(&self.monitor))?;
        inner.last_frontend = Some(Arc::clone(&handle.shared));
        inner.frontend = Some(handle);
        inner.prepared = false;
        self.monitor.advance(LoggingMode::Standby);

        info!(
            path = %inner.config.log_path.display(),
            strategy = %inner.config.strategy,
            commit_mode = %inner.config.commit_mode,
            "log manager in standby"
        );
        Ok(())
    }

    /// Drop volatile table state ahead of replay
    pub fn prepare_recovery(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.require_mode(LoggingMode::Standby, "prepare recovery")?;
        self.storage.evict_volatile()?;
        inner.prepared = true;
        Ok(())
    }

    /// Enter Recovery; the frontend replays the log and moves on to Logging
    pub fn start_recovery_mode(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.require_mode(LoggingMode::Standby, "start recovery")?;
        if !inner.prepared {
            return Err(NvlogError::Sequencing(
                "prepare_recovery must run before recovery".to_string(),
            ));
        }
        inner.prepared = false;
        let frontend = inner
            .frontend
            .as_ref()
            .ok_or_else(|| NvlogError::Sequencing("no frontend logger".to_string()))?;

        self.monitor.advance(LoggingMode::Recovery);
        frontend.send(FrontendCommand::Recover)
    }

    /// Go straight from Standby to Logging without replaying
    pub fn start_logging_mode(&self) -> Result<()> {
        let _inner = self.inner.lock();
        self.require_mode(LoggingMode::Standby, "start logging")?;
        self.monitor.advance(LoggingMode::Logging);
        Ok(())
    }

    /// Block until the mode becomes `target` (`expect`) or leaves it (`!expect`)
    pub fn wait_for_mode_transition(&self, target: LoggingMode, expect: bool) -> Result<()> {
        self.monitor.wait(target, expect, None)
    }

    /// Like `wait_for_mode_transition`, but gives up once `token` is cancelled
    pub fn wait_for_mode_transition_with(
        &self,
        target: LoggingMode,
        expect: bool,
        token: &CancellationToken,
    ) -> Result<()> {
        self.monitor.wait(target, expect, Some(token))
    }

    /// Drain, deregister backends, stop the frontend, enter Sleeping.
    ///
    /// Returns `Ok(false)` when there was nothing to end.
    pub fn end_logging(&self) -> Result<bool> {
        let mode = self.monitor.mode();
        match mode {
            LoggingMode::Logging | LoggingMode::Standby => {}
            LoggingMode::Recovery => self.monitor.wait(LoggingMode::Logging, true, None)?,
            LoggingMode::Failed => {
                // Reap the thread; the failure stands
                let handle = self.inner.lock().frontend.take();
                drop(handle);
                return Err(self.failure_error());
            }
            _ => return Ok(false),
        }

        let handle = self.inner.lock().frontend.take();
        let mut handle = match handle {
            Some(handle) => handle,
            None => return Ok(false),
        };

        if let Err(e) = handle.drain() {
            let _ = handle.shutdown();
            return Err(e);
        }

        self.monitor.advance(LoggingMode::Terminating);
        handle.shared.detach_all();
        handle.shutdown()?;

        if self.monitor.mode() == LoggingMode::Failed {
            return Err(self.failure_error());
        }

        let durable_lsn = handle.shared.durable_lsn();
        drop(handle);
        self.monitor.advance(LoggingMode::Sleeping);
        info!(durable_lsn, "logging ended");
        Ok(true)
    }

    /// Back to Invalid so the lifecycle can start over
    pub fn reset_log_status(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match self.monitor.mode() {
            LoggingMode::Invalid => Ok(()),
            LoggingMode::Sleeping | LoggingMode::Failed => {
                if let Some(handle) = inner.frontend.take() {
                    warn!("frontend logger still attached at reset, stopping it");
                    drop(handle);
                }
                self.monitor.reset();
                Ok(())
            }
            mode => Err(NvlogError::Sequencing(format!(
                "cannot reset log status in mode {}",
                mode
            ))),
        }
    }

    /// Forget the frontend logger and its stats
    pub fn reset_frontend_loggers(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mode = self.monitor.mode();
        if mode.has_frontend() {
            return Err(NvlogError::Sequencing(format!(
                "cannot reset frontend loggers in mode {}",
                mode
            )));
        }
        inner.frontend = None;
        inner.last_frontend = None;
        inner.prepared = false;
        Ok(())
    }

    /// Register a backend logger for the calling worker
    pub fn backend_logger(&self) -> Result<BackendLogger> {
        let inner = self.inner.lock();
        let mode = self.monitor.mode();
        if !matches!(
            mode,
            LoggingMode::Standby | LoggingMode::Recovery | LoggingMode::Logging
        ) {
            return Err(NvlogError::Sequencing(format!(
                "cannot register a backend logger in mode {}",
                mode
            )));
        }
        let frontend = inner
            .frontend
            .as_ref()
            .ok_or_else(|| NvlogError::Sequencing("no frontend logger".to_string()))?;
        Ok(frontend.shared.register(inner.config.commit_mode))
    }

    pub fn logging_mode(&self) -> LoggingMode {
        self.monitor.mode()
    }

    pub fn is_in_logging_mode(&self) -> bool {
        self.monitor.mode() == LoggingMode::Logging
    }

    pub fn contains_frontend_logger(&self) -> bool {
        self.inner.lock().frontend.is_some()
    }

    pub fn backend_count(&self) -> usize {
        self.inner
            .lock()
            .frontend
            .as_ref()
            .map(|f| f.shared.backend_count())
            .unwrap_or(0)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.inner.lock().config.log_path.clone()
    }

    /// Current log file length, 0 if it does not exist yet
    pub fn log_file_size(&self) -> Result<u64> {
        let path = self.log_file_path();
        file_size(&path)
    }

    /// Highest LSN known durable
    pub fn durable_lsn(&self) -> Lsn {
        self.inner
            .lock()
            .last_frontend
            .as_ref()
            .map(|f| f.durable_lsn())
            .unwrap_or(0)
    }

    pub fn flush_stats(&self) -> FlushStatsSnapshot {
        self.inner
            .lock()
            .last_frontend
            .as_ref()
            .map(|f| f.stats.snapshot())
            .unwrap_or_default()
    }

    /// Stats of the last completed recovery
    pub fn recovery_stats(&self) -> Option<RecoveryStats> {
        self.inner
            .lock()
            .last_frontend
            .as_ref()
            .and_then(|f| f.recovery_stats())
    }

    /// Reason the manager entered Failed
    pub fn failure(&self) -> Option<String> {
        self.monitor.failure()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn strategy(&self) -> LoggingStrategy {
        self.inner.lock().config.strategy
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.inner.lock().config.commit_mode
    }

    pub fn config(&self) -> Config {
        self.inner.lock().config.clone()
    }

    fn require_mode(&self, expected: LoggingMode, action: &str) -> Result<()> {
        let mode = self.monitor.mode();
        match mode {
            LoggingMode::Failed => Err(self.failure_error()),
            mode if mode == expected => Ok(()),
            mode => Err(NvlogError::Sequencing(format!(
                "cannot {} in mode {} (expected {})",
                action, mode, expected
            ))),
        }
    }

    fn failure_error(&self) -> NvlogError {
        NvlogError::Durability(
            self.monitor
                .failure()
                .unwrap_or_else(|| "logging failed".to_string()),
        )
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        // FrontendHandle's Drop flushes and joins
        if let Some(handle) = self.inner.get_mut().frontend.take() {
            drop(handle);
        }
    }
}

fn file_size(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
