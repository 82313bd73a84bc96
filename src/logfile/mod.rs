//! Log File Module
//!
//! The durable, append-only log: wire format, writer and reader.
//!
//! ## Responsibilities
//! - Length-prefixed, CRC32-checked record framing
//! - LSN stamping at write time (file order == LSN order)
//! - Sequential reading with torn-tail detection
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header: Magic "NVLG" (4) | Ver (2) | Strat (1)│
//! ├──────────────────────────────────────────────┤
//! │ Record 1                                     │
//! │ ┌─────────┬─────────┬──────────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Body (bincode)       │ │
//! │ └─────────┴─────────┴──────────────────────┘ │
//! ├──────────────────────────────────────────────┤
//! │ Record 2 ...                                 │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Body: lsn | type | txn_id | table_id + tuple_id | payload (WAL data only).
//! The CRC covers the length field and the body, so a crash mid-flush leaves
//! a tail that fails the check and is discarded.

mod header;
mod reader;
mod record;
mod writer;

pub use header::{LogHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use reader::{LogIterator, LogReader};
pub use record::{LogRecord, Lsn, RecordType, FRAME_HEADER_SIZE, MAX_RECORD_SIZE};
pub use writer::LogFileWriter;
