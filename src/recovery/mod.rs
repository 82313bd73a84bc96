//! Recovery Module
//!
//! Rebuilds table state from the log after a restart.
//!
//! ## Write-ahead replay
//! Data records are applied to storage in log order. Each transaction's
//! changes stay tracked until its Commit (kept) or Abort (undone) record;
//! transactions with no terminal record at the end of the log are undone.
//!
//! ## Write-behind replay
//! Tables are already durable in place. Only Commit/Abort records are
//! replayed: committed transactions drop their persisted undo images, every
//! other transaction that left undo images behind is rolled back.
//!
//! Either way replay stops at the first torn record and finishes by moving
//! the storage id counters past everything it saw.

mod replay;

use crate::logfile::Lsn;
use crate::storage::TxnId;

pub use replay::{replay_log, LogReplayer};

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records read and replayed
    pub records_replayed: u64,

    /// Data records applied to storage
    pub changes_applied: u64,

    /// Transactions with a durable Commit record
    pub txns_committed: u64,

    /// Transactions with a durable Abort record
    pub txns_aborted: u64,

    /// Transactions without a terminal record, rolled back at end of log
    pub txns_rolled_back: u64,

    /// Individual changes undone (aborts + rollbacks)
    pub changes_undone: u64,

    /// Last valid LSN, 0 for an empty log
    pub max_lsn: Lsn,

    /// Largest transaction id seen
    pub max_txn_id: TxnId,

    /// Offset of the torn record replay stopped at, if any
    pub torn_offset: Option<u64>,
}

impl RecoveryStats {
    /// Whether replay stopped early at a torn record
    pub fn was_truncated(&self) -> bool {
        self.torn_offset.is_some()
    }
}
