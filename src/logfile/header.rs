//! Log file header
//!
//! ```text
//! ┌────────────┬──────────────┬──────────────┐
//! │ Magic (4)  │ Version (2)  │ Strategy (1) │
//! └────────────┴──────────────┴──────────────┘
//! ```

use crate::config::LoggingStrategy;
use crate::error::{NvlogError, Result};

/// Identifies an nvlog log file
pub const MAGIC: [u8; 4] = *b"NVLG";

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 7;

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    pub version: u16,
    pub strategy: LoggingStrategy,
}

impl LogHeader {
    pub fn new(strategy: LoggingStrategy) -> Self {
        Self {
            version: FORMAT_VERSION,
            strategy,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6] = self.strategy.tag();
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if bytes[0..4] != MAGIC {
            return Err(NvlogError::Configuration(
                "not an nvlog log file (bad magic)".to_string(),
            ));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(NvlogError::Configuration(format!(
                "unsupported log format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        Ok(Self {
            version,
            strategy: LoggingStrategy::from_tag(bytes[6])?,
        })
    }
}
