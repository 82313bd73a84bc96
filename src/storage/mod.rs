//! Storage Module
//!
//! The tuple storage the logging engine applies records to.
//!
//! ## Responsibilities
//! - Apply insert/update/delete at a tuple locator on behalf of a transaction
//! - Keep per-transaction undo images until commit or rollback
//! - Hand out transaction and tuple identifiers
//! - Optionally persist itself in place (write-behind logging)
//!
//! The engine only talks to storage through the [`Storage`] trait;
//! [`TableStore`] is the in-memory implementation shipped with the crate.

mod table;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use table::TableStore;

/// Transaction identifier
pub type TxnId = u64;

/// Table identifier
pub type TableId = u32;

/// Tuple identifier within a table
pub type TupleId = u64;

/// Locates one tuple: table + tuple id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TupleLocator {
    pub table_id: TableId,
    pub tuple_id: TupleId,
}

impl TupleLocator {
    /// Locator carried by records that do not target a tuple (begin/commit/abort)
    pub const NONE: TupleLocator = TupleLocator {
        table_id: 0,
        tuple_id: 0,
    };

    pub fn new(table_id: TableId, tuple_id: TupleId) -> Self {
        Self { table_id, tuple_id }
    }
}

/// Apply/locate surface consumed by the logging engine
///
/// Every mutation is made on behalf of a transaction and remembers the
/// before-image so that `rollback_txn` can undo it. `commit_txn` forgets the
/// before-images.
pub trait Storage: Send + Sync {
    /// Insert (or overwrite) a tuple
    fn apply_insert(&self, txn: TxnId, locator: TupleLocator, payload: &[u8]) -> Result<()>;

    /// Replace an existing tuple
    fn apply_update(&self, txn: TxnId, locator: TupleLocator, payload: &[u8]) -> Result<()>;

    /// Remove an existing tuple
    fn apply_delete(&self, txn: TxnId, locator: TupleLocator) -> Result<()>;

    /// Read a tuple
    fn get(&self, locator: TupleLocator) -> Option<Vec<u8>>;

    /// Forget the undo images of a committed transaction
    fn commit_txn(&self, txn: TxnId);

    /// Undo every change of a transaction, newest first.
    /// Returns the number of changes undone.
    fn rollback_txn(&self, txn: TxnId) -> Result<usize>;

    /// Transactions that still hold undo images
    fn pending_txns(&self) -> Vec<TxnId>;

    /// Next transaction id
    fn allocate_txn_id(&self) -> TxnId;

    /// Next tuple id in a table
    fn allocate_tuple_id(&self, table_id: TableId) -> TupleId;

    /// Move id counters strictly past the given maxima
    fn advance_counters(&self, max_txn_id: TxnId, max_tuple_ids: &[(TableId, TupleId)]);

    /// Drop table state that is not durable on its own
    fn evict_volatile(&self) -> Result<()>;

    /// Make in-place state durable. No-op for volatile storage.
    fn persist(&self) -> Result<()>;

    /// Whether `persist` actually reaches durable media
    fn is_persistent(&self) -> bool;

    /// Number of durable page flushes performed so far (diagnostic)
    fn page_flush_count(&self) -> u64;
}
