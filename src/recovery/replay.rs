//! Log replay
//!
//! Drives a LogReader over the log and applies what it reads to storage.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::LoggingStrategy;
use crate::error::{NvlogError, Result};
use crate::logfile::{LogReader, LogRecord, RecordType};
use crate::storage::{Storage, TableId, TupleId, TupleLocator, TxnId};

use super::RecoveryStats;

/// Replay the log at `path` into `storage`
pub fn replay_log(path: &Path, strategy: LoggingStrategy, storage: &dyn Storage) -> Result<RecoveryStats> {
    let reader = LogReader::open(path)?;
    LogReplayer::new(strategy, storage).run(reader)
}

/// Replays records into storage, tracking unfinished transactions
pub struct LogReplayer<'a> {
    strategy: LoggingStrategy,
    storage: &'a dyn Storage,

    /// Changes applied per transaction that has not reached Commit/Abort
    in_flight: HashMap<TxnId, Vec<(RecordType, TupleLocator)>>,

    /// Largest tuple id seen per table
    max_tuple_ids: BTreeMap<TableId, TupleId>,

    stats: RecoveryStats,
}

impl<'a> LogReplayer<'a> {
    pub fn new(strategy: LoggingStrategy, storage: &'a dyn Storage) -> Self {
        Self {
            strategy,
            storage,
            in_flight: HashMap::new(),
            max_tuple_ids: BTreeMap::new(),
            stats: RecoveryStats::default(),
        }
    }

    /// Replay every valid record, then close out unfinished transactions
    pub fn run(mut self, mut reader: LogReader) -> Result<RecoveryStats> {
        if let Some(header) = reader.header() {
            if header.strategy != self.strategy {
                return Err(NvlogError::Configuration(format!(
                    "log was written with strategy {}, replaying as {}",
                    header.strategy, self.strategy
                )));
            }
        }

        loop {
            match reader.next_record() {
                Ok(Some(record)) => self.apply(record)?,
                Ok(None) => break,
                Err(NvlogError::TornRecord { offset, reason }) => {
                    warn!(offset, reason = %reason, "torn record in log, replaying the valid prefix only");
                    self.stats.torn_offset = Some(offset);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        self.finish()
    }

    /// Apply one record
    pub fn apply(&mut self, record: LogRecord) -> Result<()> {
        self.stats.records_replayed += 1;
        self.stats.max_lsn = self.stats.max_lsn.max(record.lsn);
        self.stats.max_txn_id = self.stats.max_txn_id.max(record.txn_id);

        let txn = record.txn_id;
        match record.record_type {
            RecordType::Begin => {
                self.in_flight.entry(txn).or_default();
            }
            RecordType::Insert | RecordType::Update | RecordType::Delete => {
                self.track_tuple(record.locator);
                if self.strategy.logs_payloads() {
                    self.apply_data(&record)?;
                } else {
                    // Write-behind data is already in place
                    self.in_flight.entry(txn).or_default();
                }
            }
            RecordType::Commit => {
                self.storage.commit_txn(txn);
                self.in_flight.remove(&txn);
                self.stats.txns_committed += 1;
            }
            RecordType::Abort => {
                let undone = self.storage.rollback_txn(txn)?;
                self.in_flight.remove(&txn);
                self.stats.txns_aborted += 1;
                self.stats.changes_undone += undone as u64;
            }
        }
        Ok(())
    }

    fn apply_data(&mut self, record: &LogRecord) -> Result<()> {
        let txn = record.txn_id;
        match record.record_type {
            RecordType::Insert => self.storage.apply_insert(txn, record.locator, payload_of(record)?)?,
            RecordType::Update => self.storage.apply_update(txn, record.locator, payload_of(record)?)?,
            RecordType::Delete => self.storage.apply_delete(txn, record.locator)?,
            _ => unreachable!("apply_data called with a control record"),
        }

        self.in_flight
            .entry(txn)
            .or_default()
            .push((record.record_type, record.locator));
        self.stats.changes_applied += 1;
        Ok(())
    }

    fn track_tuple(&mut self, locator: TupleLocator) {
        let max = self.max_tuple_ids.entry(locator.table_id).or_insert(0);
        *max = (*max).max(locator.tuple_id);
    }

    /// Roll back whatever is still unfinished and advance the id counters
    fn finish(mut self) -> Result<RecoveryStats> {
        let mut unfinished: Vec<TxnId> = self.in_flight.keys().copied().collect();
        for txn in self.storage.pending_txns() {
            if !self.in_flight.contains_key(&txn) {
                unfinished.push(txn);
            }
        }
        // Newest transactions first
        unfinished.sort_unstable_by(|a, b| b.cmp(a));

        for txn in unfinished {
            let undone = self.storage.rollback_txn(txn)?;
            debug!(txn, undone, "rolled back unfinished transaction");
            self.stats.txns_rolled_back += 1;
            self.stats.changes_undone += undone as u64;
            self.stats.max_txn_id = self.stats.max_txn_id.max(txn);
        }

        let max_tuple_ids: Vec<(TableId, TupleId)> = self.max_tuple_ids.into_iter().collect();
        self.storage.advance_counters(self.stats.max_txn_id, &max_tuple_ids);

        info!(
            strategy = %self.strategy,
            records = self.stats.records_replayed,
            committed = self.stats.txns_committed,
            aborted = self.stats.txns_aborted,
            rolled_back = self.stats.txns_rolled_back,
            max_lsn = self.stats.max_lsn,
            truncated = self.stats.was_truncated(),
            "log replay complete"
        );
        Ok(self.stats)
    }
}

fn payload_of(record: &LogRecord) -> Result<&[u8]> {
    record.payload.as_deref().ok_or_else(|| {
        NvlogError::Serialization(format!(
            "{:?} record at LSN {} carries no payload",
            record.record_type, record.lsn
        ))
    })
}
