//! Log record definitions
//!
//! Defines the structure of individual log records and their framing.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{NvlogError, Result};
use crate::storage::{TupleLocator, TxnId};

/// Log Sequence Number
pub type Lsn = u64;

/// Frame header: body length (4) + CRC32 (4)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest body a reader accepts before declaring the frame torn (64 MB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Kind of log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Begin,
    Insert,
    Update,
    Delete,
    Commit,
    Abort,
}

impl RecordType {
    /// Insert/Update/Delete
    pub fn is_data(self) -> bool {
        matches!(self, RecordType::Insert | RecordType::Update | RecordType::Delete)
    }

    /// Commit/Abort
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordType::Commit | RecordType::Abort)
    }
}

/// A single record in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stamped by the frontend logger when the record is written; 0 while buffered
    pub lsn: Lsn,

    pub record_type: RecordType,

    pub txn_id: TxnId,

    /// Target tuple, `TupleLocator::NONE` for begin/commit/abort
    pub locator: TupleLocator,

    /// After-image, present only for write-ahead insert/update records
    pub payload: Option<Vec<u8>>,
}

impl LogRecord {
    pub fn begin(txn_id: TxnId) -> Self {
        Self::control(RecordType::Begin, txn_id)
    }

    pub fn commit(txn_id: TxnId) -> Self {
        Self::control(RecordType::Commit, txn_id)
    }

    pub fn abort(txn_id: TxnId) -> Self {
        Self::control(RecordType::Abort, txn_id)
    }

    pub fn insert(txn_id: TxnId, locator: TupleLocator, payload: Vec<u8>) -> Self {
        Self::data(RecordType::Insert, txn_id, locator, Some(payload))
    }

    pub fn update(txn_id: TxnId, locator: TupleLocator, payload: Vec<u8>) -> Self {
        Self::data(RecordType::Update, txn_id, locator, Some(payload))
    }

    pub fn delete(txn_id: TxnId, locator: TupleLocator) -> Self {
        Self::data(RecordType::Delete, txn_id, locator, None)
    }

    fn control(record_type: RecordType, txn_id: TxnId) -> Self {
        Self {
            lsn: 0,
            record_type,
            txn_id,
            locator: TupleLocator::NONE,
            payload: None,
        }
    }

    fn data(record_type: RecordType, txn_id: TxnId, locator: TupleLocator, payload: Option<Vec<u8>>) -> Self {
        Self {
            lsn: 0,
            record_type,
            txn_id,
            locator,
            payload,
        }
    }

    /// Cheap upper bound of the framed size, used for flush thresholds
    pub fn approximate_size(&self) -> usize {
        // lsn + tag + txn + table + tuple + option tag + payload length
        const FIXED: usize = 8 + 4 + 8 + 4 + 8 + 1 + 8;
        FRAME_HEADER_SIZE + FIXED + self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Append the framed record: body_len (4) + crc (4) + body
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let body = bincode::serialize(self)?;
        check_body_size(body.len())?;
        buf.reserve(FRAME_HEADER_SIZE + body.len());
        buf.put_u32_le(body.len() as u32);
        buf.put_u32_le(frame_crc(body.len() as u32, &body));
        buf.put_slice(&body);
        Ok(())
    }

    /// Fail if the encoded body would not fit in one frame
    pub fn check_size(&self) -> Result<()> {
        let body_len = bincode::serialized_size(self)?;
        check_body_size(usize::try_from(body_len).unwrap_or(usize::MAX))
    }

    /// Encode a single framed record
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode a body whose frame said `len` bytes and checksum `crc`
    pub fn decode_body(body: &[u8], crc: u32) -> Result<Self> {
        let computed = frame_crc(body.len() as u32, body);
        if computed != crc {
            return Err(NvlogError::Serialization(format!(
                "CRC mismatch: stored 0x{:08x}, computed 0x{:08x}",
                crc, computed
            )));
        }
        Ok(bincode::deserialize(body)?)
    }
}

/// CRC covers the length field and the body
fn frame_crc(len: u32, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&len.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}

fn check_body_size(len: usize) -> Result<()> {
    if len > MAX_RECORD_SIZE {
        return Err(NvlogError::Serialization(format!(
            "record body of {} bytes exceeds maximum {}",
            len, MAX_RECORD_SIZE
        )));
    }
    Ok(())
}
