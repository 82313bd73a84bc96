//! Backend Logger
//!
//! One per worker thread. Records are appended to a private buffer that
//! the frontend logger swaps out on every flush; synchronous commits then
//! park on the slot's condvar until the frontend reports the commit durable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::{CommitMode, LoggingStrategy};
use crate::error::{NvlogError, Result};
use crate::logfile::{LogRecord, Lsn};
use crate::storage::TxnId;

use super::frontend::FrontendShared;

pub type BackendId = usize;

#[derive(Default)]
struct PendingBuffer {
    records: Vec<LogRecord>,
    bytes: usize,

    /// Records ever appended to this slot; doubles as the sequence number
    appended: u64,
}

#[derive(Default)]
struct DurableState {
    /// Highest sequence number known durable
    seq: u64,

    /// LSN of the last durable record from this slot
    lsn: Lsn,

    failure: Option<String>,
}

/// Records taken from a slot by a flush
pub(crate) struct TakenRecords {
    pub(crate) records: Vec<LogRecord>,
    pub(crate) bytes: usize,

    /// Sequence number of the last taken record
    pub(crate) seq: u64,
}

/// State shared between one BackendLogger and the frontend logger
pub(crate) struct BackendSlot {
    id: BackendId,
    buffer: Mutex<PendingBuffer>,
    durable: Mutex<DurableState>,
    durable_changed: Condvar,
    detached: AtomicBool,
}

impl BackendSlot {
    pub(crate) fn new(id: BackendId) -> Self {
        Self {
            id,
            buffer: Mutex::new(PendingBuffer::default()),
            durable: Mutex::new(DurableState::default()),
            durable_changed: Condvar::new(),
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> BackendId {
        self.id
    }

    /// Swap out the pending buffer
    pub(crate) fn take_pending(&self) -> Option<TakenRecords> {
        let mut buffer = self.buffer.lock();
        if buffer.records.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut buffer.records);
        let bytes = std::mem::take(&mut buffer.bytes);
        Some(TakenRecords {
            records,
            bytes,
            seq: buffer.appended,
        })
    }

    pub(crate) fn mark_durable(&self, seq: u64, lsn: Lsn) {
        let mut durable = self.durable.lock();
        if seq > durable.seq {
            durable.seq = seq;
            durable.lsn = lsn;
        }
        self.durable_changed.notify_all();
    }

    pub(crate) fn mark_failed(&self, reason: &str) {
        let mut durable = self.durable.lock();
        if durable.failure.is_none() {
            durable.failure = Some(reason.to_string());
        }
        self.durable_changed.notify_all();
    }

    /// Refuse further appends. Taken under the buffer lock so a flush that
    /// runs afterwards sees every record that was accepted.
    pub(crate) fn detach(&self) {
        let _buffer = self.buffer.lock();
        self.detached.store(true, Ordering::SeqCst);
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Per-thread handle for appending records and committing transactions
pub struct BackendLogger {
    slot: Arc<BackendSlot>,
    frontend: Arc<FrontendShared>,
    strategy: LoggingStrategy,
    commit_mode: CommitMode,
}

impl BackendLogger {
    pub(crate) fn new(
        slot: Arc<BackendSlot>,
        frontend: Arc<FrontendShared>,
        strategy: LoggingStrategy,
        commit_mode: CommitMode,
    ) -> Self {
        Self {
            slot,
            frontend,
            strategy,
            commit_mode,
        }
    }

    pub fn id(&self) -> BackendId {
        self.slot.id()
    }

    pub fn strategy(&self) -> LoggingStrategy {
        self.strategy
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// Append a record to the local buffer.
    ///
    /// Under write-behind only Commit/Abort records are kept; everything
    /// else is accepted and dropped. Returns the record's local sequence
    /// number. Records are refused until recovery has finished, and a
    /// record too large for one frame is rejected here rather than on the
    /// frontend thread.
    pub fn append(&self, record: LogRecord) -> Result<u64> {
        let keep = self.strategy.logs_payloads() || record.record_type.is_terminal();
        if keep {
            record.check_size()?;
        }
        let size = record.approximate_size();

        let (seq, nudge) = {
            let mut buffer = self.slot.buffer.lock();
            self.check_open()?;
            if !keep {
                return Ok(buffer.appended);
            }
            buffer.records.push(record);
            buffer.bytes += size;
            buffer.appended += 1;
            (buffer.appended, self.frontend.note_appended(size))
        };

        if nudge {
            self.frontend.nudge();
        }
        Ok(seq)
    }

    /// Append a Commit record for `txn_id`.
    ///
    /// Synchronous mode blocks until the commit is durable and returns a
    /// durable LSN at or past the Commit record. Asynchronous mode returns
    /// `None` right away.
    pub fn commit(&self, txn_id: TxnId) -> Result<Option<Lsn>> {
        self.check_failure()?;
        let seq = self.append(LogRecord::commit(txn_id))?;
        match self.commit_mode {
            CommitMode::Asynchronous => Ok(None),
            CommitMode::Synchronous => self.wait_durable(seq).map(Some),
        }
    }

    /// Append an Abort record for `txn_id`; never waits
    pub fn abort(&self, txn_id: TxnId) -> Result<()> {
        self.append(LogRecord::abort(txn_id)).map(|_| ())
    }

    /// LSN of the last durable record this backend appended
    pub fn probe(&self) -> Result<Lsn> {
        let durable = self.slot.durable.lock();
        match &durable.failure {
            Some(reason) => Err(NvlogError::Durability(reason.clone())),
            None => Ok(durable.lsn),
        }
    }

    /// Records appended but not yet taken by a flush
    pub fn pending_records(&self) -> usize {
        self.slot.buffer.lock().records.len()
    }

    /// Block until every record up to `seq` is durable
    pub fn wait_durable(&self, seq: u64) -> Result<Lsn> {
        let mut durable = self.slot.durable.lock();
        loop {
            if let Some(reason) = &durable.failure {
                return Err(NvlogError::Durability(reason.clone()));
            }
            if durable.seq >= seq {
                return Ok(durable.lsn);
            }
            self.slot.durable_changed.wait(&mut durable);
        }
    }

    /// Fail unless this logger would take an append right now
    pub fn ensure_accepting(&self) -> Result<()> {
        let _buffer = self.slot.buffer.lock();
        self.check_open()
    }

    fn check_open(&self) -> Result<()> {
        if self.slot.is_detached() {
            return Err(NvlogError::Sequencing(format!(
                "backend logger {} is no longer registered",
                self.slot.id()
            )));
        }
        self.frontend.check_accepting()
    }

    fn check_failure(&self) -> Result<()> {
        match &self.slot.durable.lock().failure {
            Some(reason) => Err(NvlogError::Durability(reason.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BackendLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLogger")
            .field("id", &self.slot.id())
            .field("strategy", &self.strategy)
            .field("commit_mode", &self.commit_mode)
            .finish()
    }
}
