//! TableStore implementation
//!
//! BTreeMap-based tuple store with RwLock for concurrency, per-transaction
//! undo images, and an optional on-disk image standing in for persistent
//! memory.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NvlogError, Result};

use super::{Storage, TableId, TupleId, TupleLocator, TxnId};

/// Before-image of one change
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UndoEntry {
    locator: TupleLocator,
    before: Option<Vec<u8>>,
}

/// Everything written to the image file on `persist`
#[derive(Debug, Default, Serialize, Deserialize)]
struct TableImage {
    tuples: Vec<(TupleLocator, Vec<u8>)>,
    undo: Vec<(TxnId, Vec<UndoEntry>)>,
    next_txn_id: TxnId,
    next_tuple_ids: Vec<(TableId, TupleId)>,
}

/// In-memory tuple store
///
/// ## Concurrency:
/// - `tuples`: RwLock (many readers, exclusive writer)
/// - `undo`: Mutex, always acquired after `tuples`
/// - id counters: atomics, lock-free
pub struct TableStore {
    /// Live tuples ordered by locator
    tuples: RwLock<BTreeMap<TupleLocator, Vec<u8>>>,

    /// Undo images of transactions that have not committed yet
    undo: Mutex<HashMap<TxnId, Vec<UndoEntry>>>,

    next_txn_id: AtomicU64,
    next_tuple_ids: Mutex<HashMap<TableId, TupleId>>,

    /// Image file for persistent stores, None for volatile ones
    image_path: Option<PathBuf>,

    /// Set by every mutation, cleared by `persist`
    dirty: AtomicBool,

    page_flushes: AtomicU64,

    /// Serializes image writers
    persist_lock: Mutex<()>,
}

impl TableStore {
    /// Create an empty volatile store
    pub fn new() -> Self {
        Self::with_image(None)
    }

    /// Open a persistent store backed by an image file, loading it if present
    pub fn persistent(image_path: impl Into<PathBuf>) -> Result<Self> {
        let image_path = image_path.into();
        let store = Self::with_image(Some(image_path.clone()));
        if image_path.exists() {
            store.load_image(&image_path)?;
        }
        Ok(store)
    }

    fn with_image(image_path: Option<PathBuf>) -> Self {
        Self {
            tuples: RwLock::new(BTreeMap::new()),
            undo: Mutex::new(HashMap::new()),
            next_txn_id: AtomicU64::new(1),
            next_tuple_ids: Mutex::new(HashMap::new()),
            image_path,
            dirty: AtomicBool::new(false),
            page_flushes: AtomicU64::new(0),
            persist_lock: Mutex::new(()),
        }
    }

    /// Number of live tuples
    pub fn len(&self) -> usize {
        self.tuples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.read().is_empty()
    }

    /// Copy of every live tuple, ordered by locator
    pub fn snapshot(&self) -> BTreeMap<TupleLocator, Vec<u8>> {
        self.tuples.read().clone()
    }

    /// Image file path, if persistent
    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Peek at the next transaction id without allocating it
    pub fn next_txn_id(&self) -> TxnId {
        self.next_txn_id.load(Ordering::SeqCst)
    }

    /// Peek at the next tuple id of a table without allocating it
    pub fn next_tuple_id(&self, table_id: TableId) -> TupleId {
        self.next_tuple_ids.lock().get(&table_id).copied().unwrap_or(1)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn clear(&self) {
        let mut tuples = self.tuples.write();
        let mut undo = self.undo.lock();
        tuples.clear();
        undo.clear();
        self.next_txn_id.store(1, Ordering::SeqCst);
        self.next_tuple_ids.lock().clear();
    }

    fn load_image(&self, path: &Path) -> Result<()> {
        let bytes = fs::read(path)?;
        let image: TableImage = bincode::deserialize(&bytes)?;

        let mut tuples = self.tuples.write();
        let mut undo = self.undo.lock();
        *tuples = image.tuples.into_iter().collect();
        *undo = image.undo.into_iter().collect();
        self.next_txn_id.store(image.next_txn_id.max(1), Ordering::SeqCst);
        *self.next_tuple_ids.lock() = image.next_tuple_ids.into_iter().collect();
        self.dirty.store(false, Ordering::SeqCst);

        debug!(
            path = %path.display(),
            tuples = tuples.len(),
            pending_txns = undo.len(),
            "loaded table image"
        );
        Ok(())
    }

    fn record_undo(&self, undo: &mut HashMap<TxnId, Vec<UndoEntry>>, txn: TxnId, locator: TupleLocator, before: Option<Vec<u8>>) {
        undo.entry(txn).or_default().push(UndoEntry { locator, before });
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn write_image(&self, path: &Path, image: &TableImage) -> Result<()> {
        let bytes = bincode::serialize(image)?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for TableStore {
    fn apply_insert(&self, txn: TxnId, locator: TupleLocator, payload: &[u8]) -> Result<()> {
        let mut tuples = self.tuples.write();
        let mut undo = self.undo.lock();
        let before = tuples.insert(locator, payload.to_vec());
        self.record_undo(&mut undo, txn, locator, before);
        Ok(())
    }

    fn apply_update(&self, txn: TxnId, locator: TupleLocator, payload: &[u8]) -> Result<()> {
        let mut tuples = self.tuples.write();
        let slot = tuples.get_mut(&locator).ok_or_else(|| {
            NvlogError::Storage(format!(
                "update of missing tuple {}:{}",
                locator.table_id, locator.tuple_id
            ))
        })?;
        let before = std::mem::replace(slot, payload.to_vec());

        let mut undo = self.undo.lock();
        self.record_undo(&mut undo, txn, locator, Some(before));
        Ok(())
    }

    fn apply_delete(&self, txn: TxnId, locator: TupleLocator) -> Result<()> {
        let mut tuples = self.tuples.write();
        let before = tuples.remove(&locator).ok_or_else(|| {
            NvlogError::Storage(format!(
                "delete of missing tuple {}:{}",
                locator.table_id, locator.tuple_id
            ))
        })?;

        let mut undo = self.undo.lock();
        self.record_undo(&mut undo, txn, locator, Some(before));
        Ok(())
    }

    fn get(&self, locator: TupleLocator) -> Option<Vec<u8>> {
        self.tuples.read().get(&locator).cloned()
    }

    fn commit_txn(&self, txn: TxnId) {
        if self.undo.lock().remove(&txn).is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    fn rollback_txn(&self, txn: TxnId) -> Result<usize> {
        let mut tuples = self.tuples.write();
        let entries = match self.undo.lock().remove(&txn) {
            Some(entries) => entries,
            None => return Ok(0),
        };

        let undone = entries.len();
        for entry in entries.into_iter().rev() {
            match entry.before {
                Some(before) => {
                    tuples.insert(entry.locator, before);
                }
                None => {
                    tuples.remove(&entry.locator);
                }
            }
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(undone)
    }

    fn pending_txns(&self) -> Vec<TxnId> {
        let mut txns: Vec<TxnId> = self.undo.lock().keys().copied().collect();
        txns.sort_unstable();
        txns
    }

    fn allocate_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    fn allocate_tuple_id(&self, table_id: TableId) -> TupleId {
        let mut ids = self.next_tuple_ids.lock();
        let next = ids.entry(table_id).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn advance_counters(&self, max_txn_id: TxnId, max_tuple_ids: &[(TableId, TupleId)]) {
        self.next_txn_id.fetch_max(max_txn_id + 1, Ordering::SeqCst);

        let mut ids = self.next_tuple_ids.lock();
        for &(table_id, max_tuple_id) in max_tuple_ids {
            let next = ids.entry(table_id).or_insert(1);
            *next = (*next).max(max_tuple_id + 1);
        }
    }

    fn evict_volatile(&self) -> Result<()> {
        match &self.image_path {
            Some(path) if path.exists() => self.load_image(path),
            _ => {
                self.clear();
                Ok(())
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let path = match &self.image_path {
            Some(path) => path,
            None => return Ok(()),
        };

        let _guard = self.persist_lock.lock();
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let image = {
            let tuples = self.tuples.read();
            let undo = self.undo.lock();
            TableImage {
                tuples: tuples.iter().map(|(k, v)| (*k, v.clone())).collect(),
                undo: undo.iter().map(|(t, e)| (*t, e.clone())).collect(),
                next_txn_id: self.next_txn_id.load(Ordering::SeqCst),
                next_tuple_ids: self.next_tuple_ids.lock().iter().map(|(t, n)| (*t, *n)).collect(),
            }
        };

        if let Err(e) = self.write_image(path, &image) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        self.page_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        self.image_path.is_some()
    }

    fn page_flush_count(&self) -> u64 {
        self.page_flushes.load(Ordering::SeqCst)
    }
}
