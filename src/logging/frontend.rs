//! Frontend Logger
//!
//! The single thread that owns the log file. It wakes on a command, on a
//! buffer-threshold nudge from a backend, or when the flush period
//! elapses; each flush gathers every backend buffer into one batch,
//! writes it with one sync, and releases the waiting commits.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::{CommitMode, Config, FlushPolicy, LatencyModel, LoggingStrategy};
use crate::error::{NvlogError, Result};
use crate::logfile::{LogFileWriter, Lsn};
use crate::recovery::{replay_log, RecoveryStats};
use crate::storage::Storage;

use super::backend::{BackendLogger, BackendSlot};
use super::mode::{LoggingMode, ModeMonitor};
use super::stats::FlushStats;

/// Delays shorter than this are spun instead of slept
const SPIN_THRESHOLD: Duration = Duration::from_micros(50);

pub(crate) enum FrontendCommand {
    /// Replay the log, then enter Logging
    Recover,
    /// Flush everything buffered and report back
    Drain(Sender<Result<()>>),
    /// Final flush, deregister backends, exit
    Shutdown,
}

/// State the frontend shares with backends and the manager
pub(crate) struct FrontendShared {
    strategy: LoggingStrategy,
    policy: FlushPolicy,
    backends: Mutex<Vec<Arc<BackendSlot>>>,
    next_backend_id: AtomicUsize,
    pending_bytes: AtomicUsize,
    pending_records: AtomicUsize,
    nudge_tx: Sender<()>,
    monitor: Arc<ModeMonitor>,
    durable_lsn: AtomicU64,
    failure: Mutex<Option<String>>,
    recovery: Mutex<Option<RecoveryStats>>,
    pub(crate) stats: FlushStats,
}

impl FrontendShared {
    fn new(
        strategy: LoggingStrategy,
        policy: FlushPolicy,
        nudge_tx: Sender<()>,
        monitor: Arc<ModeMonitor>,
        durable_lsn: Lsn,
    ) -> Self {
        Self {
            strategy,
            policy,
            backends: Mutex::new(Vec::new()),
            next_backend_id: AtomicUsize::new(0),
            pending_bytes: AtomicUsize::new(0),
            pending_records: AtomicUsize::new(0),
            nudge_tx,
            monitor,
            durable_lsn: AtomicU64::new(durable_lsn),
            failure: Mutex::new(None),
            recovery: Mutex::new(None),
            stats: FlushStats::default(),
        }
    }

    /// Register a new backend slot
    pub(crate) fn register(self: &Arc<Self>, commit_mode: CommitMode) -> BackendLogger {
        let id = self.next_backend_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(BackendSlot::new(id));

        // Held across the failure check so a concurrent fail() sees this slot
        let mut backends = self.backends.lock();
        if let Some(reason) = self.failure.lock().as_deref() {
            slot.mark_failed(reason);
        }
        backends.push(Arc::clone(&slot));
        drop(backends);

        debug!(backend = id, "registered backend logger");
        BackendLogger::new(slot, Arc::clone(self), self.strategy, commit_mode)
    }

    /// Appends are taken only once recovery has finished and until the
    /// backends are detached at shutdown
    pub(crate) fn check_accepting(&self) -> Result<()> {
        match self.monitor.mode() {
            LoggingMode::Logging | LoggingMode::Terminating => Ok(()),
            LoggingMode::Failed => Err(NvlogError::Durability(
                self.monitor
                    .failure()
                    .unwrap_or_else(|| "logging failed".to_string()),
            )),
            mode => Err(NvlogError::Sequencing(format!(
                "cannot append log records in mode {}",
                mode
            ))),
        }
    }

    pub(crate) fn backend_count(&self) -> usize {
        self.backends.lock().len()
    }

    /// Stop accepting appends from every registered backend
    pub(crate) fn detach_all(&self) {
        for slot in self.backends.lock().iter() {
            slot.detach();
        }
    }

    /// Account for an appended record; true when a threshold is crossed
    pub(crate) fn note_appended(&self, bytes: usize) -> bool {
        let total_bytes = self.pending_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        let total_records = self.pending_records.fetch_add(1, Ordering::AcqRel) + 1;
        total_bytes >= self.policy.max_buffered_bytes || total_records >= self.policy.max_buffered_records
    }

    /// Wake the frontend early. One pending nudge is enough.
    pub(crate) fn nudge(&self) {
        let _ = self.nudge_tx.try_send(());
    }

    pub(crate) fn durable_lsn(&self) -> Lsn {
        self.durable_lsn.load(Ordering::Acquire)
    }

    pub(crate) fn recovery_stats(&self) -> Option<RecoveryStats> {
        self.recovery.lock().clone()
    }

    fn slots(&self) -> Vec<Arc<BackendSlot>> {
        self.backends.lock().clone()
    }
}

/// Manager-side handle to a running frontend thread
pub(crate) struct FrontendHandle {
    pub(crate) shared: Arc<FrontendShared>,
    cmd_tx: Sender<FrontendCommand>,
    thread: Option<JoinHandle<()>>,
}

impl FrontendHandle {
    pub(crate) fn send(&self, cmd: FrontendCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| self.exited_error())
    }

    /// Flush everything appended so far and wait for it to be durable
    pub(crate) fn drain(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.send(FrontendCommand::Drain(ack_tx))?;
        ack_rx.recv().map_err(|_| self.exited_error())?
    }

    /// Ask the thread to finish and wait for it
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        let _ = self.cmd_tx.send(FrontendCommand::Shutdown);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| NvlogError::Durability("frontend logger thread panicked".to_string())),
            None => Ok(()),
        }
    }

    fn exited_error(&self) -> NvlogError {
        match self.shared.failure.lock().clone() {
            Some(reason) => NvlogError::Durability(reason),
            None => NvlogError::Sequencing("frontend logger has exited".to_string()),
        }
    }
}

impl Drop for FrontendHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// The frontend logger thread's state
pub(crate) struct FrontendLogger {
    strategy: LoggingStrategy,
    policy: FlushPolicy,
    latency: LatencyModel,
    writer: LogFileWriter,
    shared: Arc<FrontendShared>,
    storage: Arc<dyn Storage>,
    monitor: Arc<ModeMonitor>,
    cmd_rx: Receiver<FrontendCommand>,
    nudge_rx: Receiver<()>,
    last_flush: Instant,
}

impl FrontendLogger {
    /// Open the log file and start the frontend thread
    pub(crate) fn spawn(
        config: &Config,
        storage: Arc<dyn Storage>,
        monitor: Arc<ModeMonitor>,
    ) -> Result<FrontendHandle> {
        let writer = LogFileWriter::open(&config.log_path, config.strategy)?;
        let (cmd_tx, cmd_rx) = unbounded();
        let (nudge_tx, nudge_rx) = bounded(1);

        let shared = Arc::new(FrontendShared::new(
            config.strategy,
            config.flush_policy,
            nudge_tx,
            Arc::clone(&monitor),
            writer.next_lsn().saturating_sub(1),
        ));

        let frontend = FrontendLogger {
            strategy: config.strategy,
            policy: config.flush_policy,
            latency: config.latency_model,
            writer,
            shared: Arc::clone(&shared),
            storage,
            monitor,
            cmd_rx,
            nudge_rx,
            last_flush: Instant::now(),
        };

        let thread = thread::Builder::new()
            .name("nvlog-frontend".to_string())
            .spawn(move || frontend.run())?;

        Ok(FrontendHandle {
            shared,
            cmd_tx,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        info!(
            path = %self.writer.path().display(),
            strategy = %self.strategy,
            "frontend logger started"
        );

        let cmd_rx = self.cmd_rx.clone();
        let nudge_rx = self.nudge_rx.clone();
        loop {
            let timeout = self.policy.period.saturating_sub(self.last_flush.elapsed());
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(FrontendCommand::Recover) => {
                        if let Err(e) = self.recover() {
                            self.fail(&format!("recovery failed: {}", failure_reason(&e)));
                            return;
                        }
                    }
                    Ok(FrontendCommand::Drain(ack)) => {
                        let result = self.flush().map(|_| ());
                        let failed = result.is_err();
                        if let Err(e) = &result {
                            self.fail(&failure_reason(e));
                        }
                        let _ = ack.send(result);
                        if failed {
                            return;
                        }
                    }
                    Ok(FrontendCommand::Shutdown) | Err(_) => {
                        self.stop();
                        return;
                    }
                },
                recv(nudge_rx) -> _ => {
                    if !self.flush_or_fail() {
                        return;
                    }
                }
                default(timeout) => {
                    if !self.flush_or_fail() {
                        return;
                    }
                }
            }
        }
    }

    fn flush_or_fail(&mut self) -> bool {
        match self.flush() {
            Ok(_) => true,
            Err(e) => {
                self.fail(&failure_reason(&e));
                false
            }
        }
    }

    /// Write one group-commit batch. Returns the number of records written.
    fn flush(&mut self) -> Result<usize> {
        self.last_flush = Instant::now();

        let slots = self.shared.slots();
        let mut batch = Vec::new();
        let mut marks = Vec::with_capacity(slots.len());
        let mut taken_bytes = 0;
        for slot in slots {
            if let Some(taken) = slot.take_pending() {
                taken_bytes += taken.bytes;
                batch.extend(taken.records);
                marks.push((slot, taken.seq, batch.len() - 1));
            }
        }

        if batch.is_empty() {
            return Ok(0);
        }
        self.shared.pending_bytes.fetch_sub(taken_bytes, Ordering::AcqRel);
        self.shared.pending_records.fetch_sub(batch.len(), Ordering::AcqRel);

        let started = Instant::now();
        let start_offset = self.writer.offset();

        // Table changes must be durable before the commits that cover them
        if !self.strategy.logs_payloads() {
            self.storage
                .persist()
                .map_err(|e| NvlogError::Durability(format!("persisting tables failed: {}", e)))?;
        }

        emulate_latency(self.latency.per_flush_delay);
        let last_lsn = self
            .writer
            .append_batch(&mut batch)
            .map_err(|e| NvlogError::Durability(format!("writing log batch failed: {}", e)))?
            .unwrap_or_else(|| self.shared.durable_lsn());
        emulate_latency(self.latency.per_commit_delay);

        self.shared.durable_lsn.store(last_lsn, Ordering::Release);
        for (slot, seq, last_index) in marks {
            slot.mark_durable(seq, batch[last_index].lsn);
        }

        let written = self.writer.offset() - start_offset;
        self.shared.stats.record(batch.len(), written, started.elapsed());
        debug!(records = batch.len(), bytes = written, last_lsn, "flushed log batch");
        Ok(batch.len())
    }

    fn recover(&mut self) -> Result<()> {
        let stats = replay_log(self.writer.path(), self.strategy, self.storage.as_ref())?;
        if !self.strategy.logs_payloads() {
            self.storage.persist()?;
        }
        *self.shared.recovery.lock() = Some(stats);
        self.monitor.advance(LoggingMode::Logging);
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.flush() {
            self.fail(&failure_reason(&e));
            return;
        }
        if !self.strategy.logs_payloads() {
            if let Err(e) = self.storage.persist() {
                self.fail(&format!("persisting tables failed: {}", e));
                return;
            }
        }
        self.shared.backends.lock().clear();
        info!(
            durable_lsn = self.shared.durable_lsn(),
            "frontend logger stopped"
        );
    }

    /// Record the failure everywhere a caller might be waiting
    fn fail(&self, reason: &str) {
        error!(reason, "frontend logger failed");
        // Mode first, so a woken committer already observes Failed
        self.monitor.fail(reason);
        let backends = self.shared.backends.lock();
        *self.shared.failure.lock() = Some(reason.to_string());
        for slot in backends.iter() {
            slot.mark_failed(reason);
        }
    }
}

/// Reason text for a frontend failure, without re-wrapping durability errors
fn failure_reason(error: &NvlogError) -> String {
    match error {
        NvlogError::Durability(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Emulated device latency
fn emulate_latency(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    if delay < SPIN_THRESHOLD {
        let start = Instant::now();
        while start.elapsed() < delay {
            std::hint::spin_loop();
        }
    } else {
        thread::sleep(delay);
    }
}
