//! Tests for group commit through backend loggers
//!
//! These tests verify:
//! - Synchronous commits return only once their Commit record is durable
//! - Asynchronous commits return immediately
//! - Per-backend record order survives batching
//! - Write-behind keeps only Commit/Abort records
//! - Flush thresholds and latency emulation
//! - Oversized records are refused without hurting other backends

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nvlog::config::{CommitMode, Config, LoggingStrategy};
use nvlog::logfile::{LogReader, LogRecord, RecordType, MAX_RECORD_SIZE};
use nvlog::storage::{TableStore, TupleLocator};
use nvlog::{LogManager, LoggingMode, NvlogError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn start(config: Config) -> LogManager {
    let manager = LogManager::new(config, Arc::new(TableStore::new())).unwrap();
    manager.start_standby_mode().unwrap();
    manager.start_logging_mode().unwrap();
    manager
}

fn read_log(path: &Path) -> Vec<LogRecord> {
    LogReader::open(path)
        .unwrap()
        .records()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn insert(txn: u64, tuple: u64) -> LogRecord {
    LogRecord::insert(txn, TupleLocator::new(1, tuple), tuple.to_le_bytes().to_vec())
}

// =============================================================================
// Synchronous Commit
// =============================================================================

#[test]
fn test_sync_commit_is_durable_on_return() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("sync.log");
    let manager = start(
        Config::builder()
            .log_path(&path)
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_millis(2))
            .build(),
    );
    let logger = manager.backend_logger().unwrap();

    logger.append(LogRecord::begin(1)).unwrap();
    logger.append(insert(1, 1)).unwrap();
    let lsn = logger.commit(1).unwrap().unwrap();

    // Visible on disk before end_logging
    let records = read_log(&path);
    let commit = records
        .iter()
        .find(|r| r.record_type == RecordType::Commit && r.txn_id == 1)
        .unwrap();
    assert!(commit.lsn <= lsn);
    assert!(manager.durable_lsn() >= lsn);
    assert_eq!(logger.probe().unwrap(), lsn);

    manager.end_logging().unwrap();
}

#[test]
fn test_sync_commit_pays_commit_delay() {
    let temp = TempDir::new().unwrap();
    let delay = Duration::from_millis(20);
    let manager = start(
        Config::builder()
            .log_path(temp.path().join("delay.log"))
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_millis(1))
            .per_commit_delay(delay)
            .build(),
    );
    let logger = manager.backend_logger().unwrap();

    let started = Instant::now();
    logger.commit(1).unwrap();
    assert!(started.elapsed() >= delay);

    let stats = manager.flush_stats();
    assert!(stats.flushes >= 1);
    assert!(stats.max_latency >= delay);
    manager.end_logging().unwrap();
}

#[test]
fn test_record_threshold_triggers_flush() {
    let temp = TempDir::new().unwrap();
    let manager = start(
        Config::builder()
            .log_path(temp.path().join("threshold.log"))
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_secs(60))
            .max_buffered_records(1)
            .build(),
    );
    let logger = manager.backend_logger().unwrap();

    // Without the nudge this would wait a full minute
    let started = Instant::now();
    logger.commit(1).unwrap();
    assert!(started.elapsed() < Duration::from_secs(30));
    manager.end_logging().unwrap();
}

#[test]
fn test_sync_commit_waits_for_periodic_flush() {
    let temp = TempDir::new().unwrap();
    let manager = start(
        Config::builder()
            .log_path(temp.path().join("periodic.log"))
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_secs(1))
            .build(),
    );
    let logger = manager.backend_logger().unwrap();
    let flushes_before = manager.flush_stats().flushes;

    logger.append(LogRecord::begin(1)).unwrap();
    let lsn = logger.commit(1).unwrap().unwrap();

    // Returned only after a flush made the commit durable
    let stats = manager.flush_stats();
    assert!(stats.flushes > flushes_before);
    assert!(stats.records >= 2);
    assert!(manager.durable_lsn() >= lsn);
    manager.end_logging().unwrap();
}

// =============================================================================
// Asynchronous Commit
// =============================================================================

#[test]
fn test_async_commit_returns_before_flush() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("async.log");
    let manager = start(
        Config::builder()
            .log_path(&path)
            .commit_mode(CommitMode::Asynchronous)
            .flush_period(Duration::from_secs(60))
            .build(),
    );
    let logger = manager.backend_logger().unwrap();

    logger.append(LogRecord::begin(1)).unwrap();
    assert_eq!(logger.commit(1).unwrap(), None);
    assert_eq!(logger.probe().unwrap(), 0);

    manager.end_logging().unwrap();
    assert_eq!(read_log(&path).len(), 2);
}

#[test]
fn test_async_commit_is_fast_with_slow_flushes() {
    let temp = TempDir::new().unwrap();
    let manager = start(
        Config::builder()
            .log_path(temp.path().join("fast.log"))
            .commit_mode(CommitMode::Asynchronous)
            .flush_period(Duration::from_secs(1))
            .build(),
    );
    let logger = manager.backend_logger().unwrap();
    logger.append(LogRecord::begin(1)).unwrap();

    let started = Instant::now();
    assert_eq!(logger.commit(1).unwrap(), None);
    assert!(started.elapsed() < Duration::from_millis(1));

    manager.end_logging().unwrap();
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_per_backend_order_across_threads() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("order.log");
    let manager = Arc::new(start(
        Config::builder()
            .log_path(&path)
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_millis(1))
            .build(),
    ));

    let workers: Vec<_> = (0..4u64)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let logger = manager.backend_logger().unwrap();
                let mut commits = Vec::new();
                for i in 0..25u64 {
                    let txn = worker * 1000 + i + 1;
                    logger.append(LogRecord::begin(txn)).unwrap();
                    logger.append(insert(txn, txn)).unwrap();
                    logger.append(LogRecord::update(txn, TupleLocator::new(1, txn), vec![1])).unwrap();
                    let lsn = logger.commit(txn).unwrap().unwrap();
                    commits.push((txn, lsn));
                }
                commits
            })
        })
        .collect();

    let acknowledged: Vec<(u64, u64)> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
    manager.end_logging().unwrap();

    let records = read_log(&path);
    assert_eq!(records.len(), 4 * 25 * 4);

    // LSNs strictly increase through the file
    assert!(records.windows(2).all(|w| w[0].lsn < w[1].lsn));

    let mut per_txn: HashMap<u64, Vec<RecordType>> = HashMap::new();
    let mut commit_lsn = HashMap::new();
    for record in &records {
        per_txn.entry(record.txn_id).or_default().push(record.record_type);
        if record.record_type == RecordType::Commit {
            commit_lsn.insert(record.txn_id, record.lsn);
        }
    }
    for types in per_txn.values() {
        assert_eq!(
            types,
            &vec![RecordType::Begin, RecordType::Insert, RecordType::Update, RecordType::Commit]
        );
    }

    // Every acknowledged commit was durable when acknowledged
    for (txn, acked) in acknowledged {
        assert!(commit_lsn[&txn] <= acked);
    }
}

// =============================================================================
// Write-Behind
// =============================================================================

#[test]
fn test_write_behind_logs_only_outcomes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("wbl.log");
    let manager = start(
        Config::builder()
            .log_path(&path)
            .strategy(LoggingStrategy::WriteBehind)
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_millis(2))
            .build(),
    );
    let logger = manager.backend_logger().unwrap();

    logger.append(LogRecord::begin(1)).unwrap();
    logger.append(insert(1, 1)).unwrap();
    logger.commit(1).unwrap();
    logger.append(LogRecord::begin(2)).unwrap();
    logger.append(insert(2, 2)).unwrap();
    logger.abort(2).unwrap();
    manager.end_logging().unwrap();

    let types: Vec<RecordType> = read_log(&path).iter().map(|r| r.record_type).collect();
    assert_eq!(types, vec![RecordType::Commit, RecordType::Abort]);
    assert_eq!(
        LogReader::open(&path).unwrap().header().unwrap().strategy,
        LoggingStrategy::WriteBehind
    );
}

// =============================================================================
// Oversized Records
// =============================================================================

#[test]
fn test_oversized_record_is_refused_at_append() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("oversized.log");
    let manager = start(
        Config::builder()
            .log_path(&path)
            .commit_mode(CommitMode::Synchronous)
            .flush_period(Duration::from_millis(2))
            .build(),
    );
    let big = manager.backend_logger().unwrap();
    let other = manager.backend_logger().unwrap();

    big.append(LogRecord::begin(1)).unwrap();
    let result = big.append(insert_sized(1, MAX_RECORD_SIZE + 1));
    assert!(matches!(result, Err(NvlogError::Serialization(_))));
    assert_eq!(big.pending_records(), 1);

    // Neither backend is affected
    big.commit(1).unwrap();
    other.append(LogRecord::begin(2)).unwrap();
    other.commit(2).unwrap();
    assert_eq!(manager.logging_mode(), LoggingMode::Logging);
    assert!(manager.failure().is_none());

    manager.end_logging().unwrap();
    assert_eq!(read_log(&path).len(), 4);
}

fn insert_sized(txn: u64, payload_len: usize) -> LogRecord {
    LogRecord::insert(txn, TupleLocator::new(1, txn), vec![0u8; payload_len])
}
