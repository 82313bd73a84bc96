//! Log File Writer
//!
//! Appends stamped record batches to the log file. Owned by the frontend
//! logger thread, which is the only place LSNs are assigned.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{info, warn};

use crate::config::LoggingStrategy;
use crate::error::{NvlogError, Result};

use super::header::{LogHeader, HEADER_SIZE};
use super::reader::LogReader;
use super::record::{LogRecord, Lsn};

/// Appends batches to the log file
pub struct LogFileWriter {
    path: PathBuf,
    file: File,
    strategy: LoggingStrategy,

    /// The header goes out with the first batch of an empty file
    header_written: bool,

    /// LSN the next record will receive
    next_lsn: Lsn,

    /// Current file length
    offset: u64,

    /// Reused encode buffer
    buffer: BytesMut,
}

impl LogFileWriter {
    /// Open or create a log file for appending.
    ///
    /// An existing file is scanned: its header must match `strategy`, the
    /// next LSN continues after the last valid record, and a torn tail is
    /// truncated so new batches never follow garbage.
    pub fn open(path: &Path, strategy: LoggingStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
            strategy,
            header_written: false,
            next_lsn: 1,
            offset: 0,
            buffer: BytesMut::with_capacity(64 * 1024),
        };

        if len > 0 {
            writer.scan_existing(len)?;
        }

        Ok(writer)
    }

    fn scan_existing(&mut self, len: u64) -> Result<()> {
        let mut reader = LogReader::open(&self.path)?;
        if let Some(header) = reader.header() {
            if header.strategy != self.strategy {
                return Err(NvlogError::Configuration(format!(
                    "log file {} was written with strategy {}, configured strategy is {}",
                    self.path.display(),
                    header.strategy,
                    self.strategy
                )));
            }
        }

        let mut records = 0u64;
        loop {
            match reader.next_record() {
                Ok(Some(_)) => records += 1,
                Ok(None) => break,
                Err(NvlogError::TornRecord { offset, reason }) => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        reason = %reason,
                        "truncating torn log tail"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let valid = reader.valid_offset();
        if valid < len {
            self.file.set_len(valid)?;
            self.file.sync_all()?;
        }

        self.header_written = valid >= HEADER_SIZE as u64;
        self.next_lsn = reader.last_lsn() + 1;
        self.offset = valid;

        info!(
            path = %self.path.display(),
            records,
            next_lsn = self.next_lsn,
            bytes = valid,
            "opened existing log file"
        );
        Ok(())
    }

    /// Stamp LSNs on `records`, write them in one piece and sync.
    ///
    /// Returns the LSN of the last record, or None for an empty batch.
    pub fn append_batch(&mut self, records: &mut [LogRecord]) -> Result<Option<Lsn>> {
        if records.is_empty() {
            return Ok(None);
        }

        self.buffer.clear();
        if !self.header_written {
            self.buffer.extend_from_slice(&LogHeader::new(self.strategy).encode());
        }

        for record in records.iter_mut() {
            record.lsn = self.next_lsn;
            self.next_lsn += 1;
            record.encode_into(&mut self.buffer)?;
        }

        self.file.write_all(&self.buffer)?;
        self.file.sync_data()?;

        self.header_written = true;
        self.offset += self.buffer.len() as u64;
        Ok(Some(self.next_lsn - 1))
    }

    /// LSN the next record will receive
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// Bytes written so far, header included
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> LoggingStrategy {
        self.strategy
    }
}
