//! Transaction Manager
//!
//! A pass-through protocol: no isolation, just the begin / change / commit
//! sequence that drives storage and a BackendLogger in the right order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{NvlogError, Result};
use crate::logfile::{LogRecord, Lsn};
use crate::logging::BackendLogger;
use crate::storage::{Storage, TableId, TupleLocator, TxnId};

/// Hands out transactions over a shared storage
pub struct TransactionManager {
    storage: Arc<dyn Storage>,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Start a transaction logged through `logger`
    pub fn begin<'a>(&'a self, logger: &'a BackendLogger) -> Result<Transaction<'a>> {
        // Ids are only safe to hand out once replay has advanced the counters
        logger.ensure_accepting()?;
        let txn_id = self.storage.allocate_txn_id();
        logger.append(LogRecord::begin(txn_id))?;
        Ok(Transaction {
            manager: self,
            logger,
            txn_id,
            state: TxnState::Active,
            changes: 0,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Zero the counters between trials
    pub fn reset_states(&self) {
        self.committed.store(0, Ordering::Relaxed);
        self.aborted.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// An open transaction. Dropping it while active aborts it.
pub struct Transaction<'a> {
    manager: &'a TransactionManager,
    logger: &'a BackendLogger,
    txn_id: TxnId,
    state: TxnState,
    changes: usize,
}

impl<'a> Transaction<'a> {
    pub fn id(&self) -> TxnId {
        self.txn_id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Changes made so far
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Insert a new tuple into `table_id`, returning where it landed
    pub fn insert(&mut self, table_id: TableId, payload: Vec<u8>) -> Result<TupleLocator> {
        self.ensure_active()?;
        let storage = &self.manager.storage;
        let locator = TupleLocator::new(table_id, storage.allocate_tuple_id(table_id));
        storage.apply_insert(self.txn_id, locator, &payload)?;
        self.logger.append(LogRecord::insert(self.txn_id, locator, payload))?;
        self.changes += 1;
        Ok(locator)
    }

    pub fn update(&mut self, locator: TupleLocator, payload: Vec<u8>) -> Result<()> {
        self.ensure_active()?;
        self.manager.storage.apply_update(self.txn_id, locator, &payload)?;
        self.logger.append(LogRecord::update(self.txn_id, locator, payload))?;
        self.changes += 1;
        Ok(())
    }

    pub fn delete(&mut self, locator: TupleLocator) -> Result<()> {
        self.ensure_active()?;
        self.manager.storage.apply_delete(self.txn_id, locator)?;
        self.logger.append(LogRecord::delete(self.txn_id, locator))?;
        self.changes += 1;
        Ok(())
    }

    /// Current tuple contents, including this transaction's own changes
    pub fn read(&self, locator: TupleLocator) -> Option<Vec<u8>> {
        self.manager.storage.get(locator)
    }

    /// Commit through the backend logger.
    ///
    /// If the commit cannot be made durable the in-memory changes are
    /// rolled back and the error is returned.
    pub fn commit(mut self) -> Result<Option<Lsn>> {
        self.ensure_active()?;
        match self.logger.commit(self.txn_id) {
            Ok(lsn) => {
                self.manager.storage.commit_txn(self.txn_id);
                self.state = TxnState::Committed;
                self.manager.committed.fetch_add(1, Ordering::Relaxed);
                Ok(lsn)
            }
            Err(e) => {
                warn!(txn = self.txn_id, error = %e, "commit failed, rolling back");
                self.state = TxnState::Aborted;
                self.manager.aborted.fetch_add(1, Ordering::Relaxed);
                self.manager.storage.rollback_txn(self.txn_id)?;
                Err(e)
            }
        }
    }

    /// Undo every change and log an Abort record
    pub fn abort(mut self) -> Result<()> {
        self.ensure_active()?;
        self.rollback()
    }

    fn rollback(&mut self) -> Result<()> {
        self.state = TxnState::Aborted;
        self.manager.aborted.fetch_add(1, Ordering::Relaxed);
        let undone = self.manager.storage.rollback_txn(self.txn_id)?;
        debug!(txn = self.txn_id, undone, "transaction aborted");
        self.logger.abort(self.txn_id)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TxnState::Active => Ok(()),
            state => Err(NvlogError::Sequencing(format!(
                "transaction {} is already {:?}",
                self.txn_id, state
            ))),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            if let Err(e) = self.rollback() {
                warn!(txn = self.txn_id, error = %e, "abort on drop failed");
            }
        }
    }
}
