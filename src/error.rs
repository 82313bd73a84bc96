//! Error types for nvlog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using NvlogError
pub type Result<T> = std::result::Result<T, NvlogError>;

/// Unified error type for nvlog operations
#[derive(Debug, Error)]
pub enum NvlogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    /// Bad log path, unknown strategy, foreign log header, invalid trial input
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `start_standby_mode` while a frontend logger already exists
    #[error("A frontend logger is already registered")]
    DoubleRegistration,

    /// Operation or wait requested from a mode it cannot be reached from
    #[error("Sequencing error: {0}")]
    Sequencing(String),

    /// Wait aborted through a cancellation token
    #[error("Wait cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Log File Errors
    // -------------------------------------------------------------------------
    /// A flushed batch could not be made durable
    #[error("Durability error: {0}")]
    Durability(String),

    /// Partial or corrupted record found while reading the log
    #[error("Torn record at offset {offset}: {reason}")]
    TornRecord { offset: u64, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    #[error("Decimal overflow: {0}")]
    DecimalOverflow(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl From<bincode::Error> for NvlogError {
    fn from(e: bincode::Error) -> Self {
        NvlogError::Serialization(e.to_string())
    }
}
