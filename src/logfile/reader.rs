//! Log Reader
//!
//! Sequential reader over a log file. Any frame that cannot be read in full
//! and verified is reported once as a torn record; reading stops there.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{NvlogError, Result};

use super::header::{LogHeader, HEADER_SIZE};
use super::record::{LogRecord, Lsn, FRAME_HEADER_SIZE, MAX_RECORD_SIZE};

/// Reads records from a log file, front to back
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: Option<LogHeader>,

    /// End offset of the last record known good
    valid_offset: u64,

    /// LSN of the last record returned
    last_lsn: Lsn,

    /// Set once a clean end or a torn record has been reached
    finished: bool,

    /// Torn-header reason, reported on the first `next_record`
    pending_torn: Option<String>,
}

impl LogReader {
    /// Open a log file and read its header.
    ///
    /// An empty file has no header and yields no records. A file too short
    /// to hold a header reports a torn record at offset 0.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header = None;
        let mut pending_torn = None;
        let mut valid_offset = 0;
        let mut finished = false;

        if len == 0 {
            finished = true;
        } else {
            let mut bytes = [0u8; HEADER_SIZE];
            let read = read_full(&mut reader, &mut bytes)?;
            if read < HEADER_SIZE {
                pending_torn = Some(format!("incomplete header ({} of {} bytes)", read, HEADER_SIZE));
            } else {
                header = Some(LogHeader::decode(&bytes)?);
                valid_offset = HEADER_SIZE as u64;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            valid_offset,
            last_lsn: 0,
            finished,
            pending_torn,
        })
    }

    /// The file header, None for an empty or torn-header file
    pub fn header(&self) -> Option<LogHeader> {
        self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last good record
    pub fn valid_offset(&self) -> u64 {
        self.valid_offset
    }

    /// LSN of the last good record, 0 if none
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file and
    /// `Err(NvlogError::TornRecord { .. })` once for a partial or corrupt
    /// frame; later calls return `Ok(None)`.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        if let Some(reason) = self.pending_torn.take() {
            self.finished = true;
            return Err(self.torn(reason));
        }
        if self.finished {
            return Ok(None);
        }

        let mut frame = [0u8; FRAME_HEADER_SIZE];
        let read = read_full(&mut self.reader, &mut frame)?;
        if read == 0 {
            self.finished = true;
            return Ok(None);
        }
        if read < FRAME_HEADER_SIZE {
            return Err(self.fail(format!("incomplete frame header ({} of {} bytes)", read, FRAME_HEADER_SIZE)));
        }

        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        let crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        if len > MAX_RECORD_SIZE {
            return Err(self.fail(format!("record length {} exceeds maximum {}", len, MAX_RECORD_SIZE)));
        }

        let mut body = vec![0u8; len];
        let read = read_full(&mut self.reader, &mut body)?;
        if read < len {
            return Err(self.fail(format!("incomplete record body ({} of {} bytes)", read, len)));
        }

        let record = match LogRecord::decode_body(&body, crc) {
            Ok(record) => record,
            Err(e) => return Err(self.fail(e.to_string())),
        };

        if record.lsn <= self.last_lsn {
            return Err(self.fail(format!(
                "LSN {} does not follow previous LSN {}",
                record.lsn, self.last_lsn
            )));
        }

        self.valid_offset += (FRAME_HEADER_SIZE + len) as u64;
        self.last_lsn = record.lsn;
        Ok(Some(record))
    }

    /// Iterate over records; iteration ends after the first error
    pub fn records(self) -> LogIterator {
        LogIterator { reader: self }
    }

    fn fail(&mut self, reason: String) -> NvlogError {
        self.finished = true;
        self.torn(reason)
    }

    fn torn(&self, reason: String) -> NvlogError {
        NvlogError::TornRecord {
            offset: self.valid_offset,
            reason,
        }
    }
}

/// Iterator over log records
pub struct LogIterator {
    reader: LogReader,
}

impl LogIterator {
    /// The underlying reader, for offsets after iteration
    pub fn reader(&self) -> &LogReader {
        &self.reader
    }
}

impl Iterator for LogIterator {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}

/// Fill `buf` as far as the file allows; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
