//! Tests for log record framing and the file header
//!
//! These tests verify:
//! - Frame layout (length, checksum, body)
//! - Checksum coverage of length and body
//! - Header encoding and rejection of foreign files

use nvlog::config::LoggingStrategy;
use nvlog::logfile::{LogHeader, LogRecord, RecordType, FRAME_HEADER_SIZE, HEADER_SIZE, MAGIC};
use nvlog::storage::TupleLocator;
use nvlog::NvlogError;

fn split_frame(bytes: &[u8]) -> (u32, u32, &[u8]) {
    let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let crc = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    (len, crc, &bytes[FRAME_HEADER_SIZE..])
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_frame_length_matches_body() {
    let record = LogRecord::insert(3, TupleLocator::new(1, 9), b"payload".to_vec());
    let bytes = record.encode().unwrap();

    let (len, _, body) = split_frame(&bytes);
    assert_eq!(len as usize, body.len());
    assert_eq!(bytes.len(), FRAME_HEADER_SIZE + body.len());
}

#[test]
fn test_decode_body_round_trip() {
    let mut record = LogRecord::update(42, TupleLocator::new(2, 7), vec![0xAB; 300]);
    record.lsn = 17;
    let bytes = record.encode().unwrap();

    let (_, crc, body) = split_frame(&bytes);
    let decoded = LogRecord::decode_body(body, crc).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_control_records_carry_no_payload() {
    for record in [LogRecord::begin(1), LogRecord::commit(1), LogRecord::abort(1)] {
        assert!(record.payload.is_none());
        assert_eq!(record.locator, TupleLocator::NONE);
    }
    assert!(LogRecord::delete(1, TupleLocator::new(1, 1)).payload.is_none());
}

#[test]
fn test_record_type_classes() {
    assert!(RecordType::Insert.is_data());
    assert!(RecordType::Delete.is_data());
    assert!(!RecordType::Begin.is_data());
    assert!(RecordType::Commit.is_terminal());
    assert!(RecordType::Abort.is_terminal());
    assert!(!RecordType::Update.is_terminal());
}

#[test]
fn test_approximate_size_is_an_upper_bound() {
    let records = [
        LogRecord::begin(u64::MAX),
        LogRecord::insert(5, TupleLocator::new(u32::MAX, u64::MAX), vec![1; 1000]),
        LogRecord::delete(5, TupleLocator::new(1, 1)),
    ];
    for record in records {
        assert!(record.approximate_size() >= record.encode().unwrap().len());
    }
}

// =============================================================================
// Checksum
// =============================================================================

#[test]
fn test_flipped_body_bit_fails_checksum() {
    let bytes = LogRecord::insert(1, TupleLocator::new(1, 1), b"abc".to_vec()).encode().unwrap();
    let (_, crc, body) = split_frame(&bytes);

    let mut corrupted = body.to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;

    let result = LogRecord::decode_body(&corrupted, crc);
    assert!(matches!(result, Err(NvlogError::Serialization(_))));
}

#[test]
fn test_checksum_covers_length() {
    let bytes = LogRecord::commit(8).encode().unwrap();
    let (_, crc, body) = split_frame(&bytes);

    // Same body presented with one byte fewer: the checksum must disagree
    let shorter = &body[..body.len() - 1];
    assert!(LogRecord::decode_body(shorter, crc).is_err());
}

// =============================================================================
// Header
// =============================================================================

#[test]
fn test_header_layout() {
    let bytes = LogHeader::new(LoggingStrategy::WriteBehind).encode();

    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(&bytes[0..4], &MAGIC);
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
    assert_eq!(bytes[6], LoggingStrategy::WriteBehind.tag());
}

#[test]
fn test_header_round_trip() {
    for strategy in [LoggingStrategy::WriteAhead, LoggingStrategy::WriteBehind] {
        let header = LogHeader::new(strategy);
        assert_eq!(LogHeader::decode(&header.encode()).unwrap(), header);
    }
}

#[test]
fn test_header_rejects_foreign_files() {
    let mut bad_magic = LogHeader::new(LoggingStrategy::WriteAhead).encode();
    bad_magic[0] = b'X';
    assert!(matches!(LogHeader::decode(&bad_magic), Err(NvlogError::Configuration(_))));

    let mut bad_version = LogHeader::new(LoggingStrategy::WriteAhead).encode();
    bad_version[4] = 99;
    assert!(matches!(LogHeader::decode(&bad_version), Err(NvlogError::Configuration(_))));

    let mut bad_strategy = LogHeader::new(LoggingStrategy::WriteAhead).encode();
    bad_strategy[6] = 0;
    assert!(matches!(LogHeader::decode(&bad_strategy), Err(NvlogError::Configuration(_))));
}
