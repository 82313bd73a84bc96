//! Logging Module
//!
//! Frontend/backend logger split with group commit.
//!
//! ## Flow
//! ```text
//!  worker ─► BackendLogger ─► per-backend buffer ─┐
//!  worker ─► BackendLogger ─► per-backend buffer ─┼─► FrontendLogger ─► log file
//!  worker ─► BackendLogger ─► per-backend buffer ─┘   (one write + sync per batch)
//! ```
//!
//! The frontend stamps LSNs as it writes, so file order and LSN order are
//! the same. A synchronous commit returns only once a flush covering its
//! Commit record has been synced.
//!
//! ## Write-behind
//! Under write-behind the frontend persists table storage before every
//! batch, so table changes are durable before the commits that cover them.

mod backend;
mod cancel;
mod frontend;
mod manager;
mod mode;
mod stats;

pub use backend::{BackendId, BackendLogger};
pub use cancel::CancellationToken;
pub use manager::LogManager;
pub use mode::LoggingMode;
pub use stats::FlushStatsSnapshot;
