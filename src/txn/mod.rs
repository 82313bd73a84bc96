//! Transactions
//!
//! Each change is applied to storage first and then appended to the
//! transaction's backend logger; commit goes through the logger and only
//! then releases the storage undo images.

mod manager;

pub use manager::{Transaction, TransactionManager, TxnState};
