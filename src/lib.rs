//! # nvlog
//!
//! Crash-recoverable logging and recovery for a transactional table store:
//! - Write-ahead (WAL) and write-behind (WBL) strategies
//! - Group commit: many backend loggers, one frontend logger, one sync per batch
//! - Synchronous or asynchronous commit acknowledgement
//! - Replay with torn-tail detection after a crash
//! - A trial harness measuring throughput, log footprint, flush latency and
//!   recovery time
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Workers (TransactionManager)                  │
//! └──────────┬───────────────────┬───────────────────┬──────────┘
//!            ▼                   ▼                   ▼
//!   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!   │ BackendLogger │   │ BackendLogger │   │ BackendLogger │
//!   └───────┬───────┘   └───────┬───────┘   └───────┬───────┘
//!           └───────────────────┼───────────────────┘
//!                               ▼
//!                      ┌─────────────────┐      ┌─────────────┐
//!                      │ FrontendLogger  │─────►│  Log file   │
//!                      │ (group commit)  │      └─────────────┘
//!                      └────────┬────────┘
//!                               │ persist (write-behind)
//!                               ▼
//!                      ┌─────────────────┐
//!                      │   TableStore    │
//!                      └─────────────────┘
//! ```
//!
//! `LogManager` owns the lifecycle (standby, recovery, logging, shutdown)
//! and hands out backend loggers.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod logfile;
pub mod logging;
pub mod recovery;
pub mod storage;
pub mod txn;
pub mod value;
pub mod trial;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NvlogError, Result};
pub use config::{CommitMode, Config, LoggingStrategy};
pub use logging::{BackendLogger, CancellationToken, LogManager, LoggingMode};
pub use recovery::RecoveryStats;
pub use storage::{Storage, TableStore, TupleLocator};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of nvlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
