//! Tests for the LogManager lifecycle
//!
//! These tests verify:
//! - Legal and illegal mode transitions
//! - Blocking and cancellable mode waits
//! - End of logging: drain, deregistration, idempotence
//! - Durability failures moving the manager to Failed

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nvlog::config::{CommitMode, Config, LoggingStrategy};
use nvlog::logfile::LogRecord;
use nvlog::storage::{TableStore, TupleLocator};
use nvlog::txn::TransactionManager;
use nvlog::{CancellationToken, LogManager, LoggingMode, NvlogError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_at(path: &Path, strategy: LoggingStrategy, commit_mode: CommitMode) -> Config {
    Config::builder()
        .log_path(path)
        .strategy(strategy)
        .commit_mode(commit_mode)
        .flush_period(Duration::from_millis(2))
        .build()
}

fn setup_manager() -> (TempDir, PathBuf, LogManager) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("manager.log");
    let config = config_at(&path, LoggingStrategy::WriteAhead, CommitMode::Synchronous);
    let manager = LogManager::new(config, Arc::new(TableStore::new())).unwrap();
    (temp, path, manager)
}

fn recover_to_logging(manager: &LogManager) {
    manager.start_standby_mode().unwrap();
    manager.prepare_recovery().unwrap();
    manager.start_recovery_mode().unwrap();
    manager.wait_for_mode_transition(LoggingMode::Logging, true).unwrap();
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_new_rejects_missing_directory() {
    let config = Config::builder().log_path("/definitely/not/here/nvlog.log").build();
    let result = LogManager::new(config, Arc::new(TableStore::new()));
    assert!(matches!(result, Err(NvlogError::Configuration(_))));
}

#[test]
fn test_set_log_file_name() {
    let (temp, _path, manager) = setup_manager();
    let other = temp.path().join("other.log");

    manager.set_log_file_name(&other).unwrap();
    assert_eq!(manager.log_file_path(), other);

    assert!(matches!(
        manager.set_log_file_name(temp.path()),
        Err(NvlogError::Configuration(_))
    ));

    manager.start_standby_mode().unwrap();
    assert!(matches!(
        manager.set_log_file_name(temp.path().join("third.log")),
        Err(NvlogError::Sequencing(_))
    ));
    manager.end_logging().unwrap();
}

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn test_full_lifecycle() {
    let (_temp, _path, manager) = setup_manager();
    assert_eq!(manager.logging_mode(), LoggingMode::Invalid);
    assert!(!manager.contains_frontend_logger());

    manager.start_standby_mode().unwrap();
    assert_eq!(manager.logging_mode(), LoggingMode::Standby);
    assert!(manager.contains_frontend_logger());

    manager.prepare_recovery().unwrap();
    manager.start_recovery_mode().unwrap();
    manager.wait_for_mode_transition(LoggingMode::Logging, true).unwrap();
    assert!(manager.is_in_logging_mode());
    assert!(manager.recovery_stats().is_some());

    assert!(manager.end_logging().unwrap());
    assert_eq!(manager.logging_mode(), LoggingMode::Sleeping);
    assert!(!manager.contains_frontend_logger());

    manager.reset_log_status().unwrap();
    manager.reset_frontend_loggers().unwrap();
    assert_eq!(manager.logging_mode(), LoggingMode::Invalid);
}

#[test]
fn test_repeated_trials_in_one_process() {
    let (_temp, _path, manager) = setup_manager();
    for _ in 0..3 {
        recover_to_logging(&manager);
        let logger = manager.backend_logger().unwrap();
        logger.append(LogRecord::begin(1)).unwrap();
        logger.commit(1).unwrap();
        assert!(manager.end_logging().unwrap());
        manager.reset_log_status().unwrap();
        manager.reset_frontend_loggers().unwrap();
    }
}

#[test]
fn test_double_registration() {
    let (_temp, _path, manager) = setup_manager();
    manager.start_standby_mode().unwrap();

    assert!(matches!(manager.start_standby_mode(), Err(NvlogError::DoubleRegistration)));
    assert_eq!(manager.logging_mode(), LoggingMode::Standby);
    manager.end_logging().unwrap();
}

#[test]
fn test_recovery_before_standby_fails() {
    let (_temp, _path, manager) = setup_manager();
    assert!(matches!(manager.start_recovery_mode(), Err(NvlogError::Sequencing(_))));
    assert!(matches!(manager.prepare_recovery(), Err(NvlogError::Sequencing(_))));
    assert_eq!(manager.logging_mode(), LoggingMode::Invalid);
}

#[test]
fn test_recovery_requires_prepare() {
    let (_temp, _path, manager) = setup_manager();
    manager.start_standby_mode().unwrap();
    assert!(matches!(manager.start_recovery_mode(), Err(NvlogError::Sequencing(_))));
    manager.end_logging().unwrap();
}

#[test]
fn test_standby_straight_to_logging() {
    let (_temp, _path, manager) = setup_manager();
    manager.start_standby_mode().unwrap();
    manager.start_logging_mode().unwrap();
    assert!(manager.is_in_logging_mode());
    assert!(manager.recovery_stats().is_none());

    assert!(matches!(manager.start_logging_mode(), Err(NvlogError::Sequencing(_))));
    manager.end_logging().unwrap();
}

#[test]
fn test_reset_only_when_stopped() {
    let (_temp, _path, manager) = setup_manager();
    manager.reset_log_status().unwrap();

    recover_to_logging(&manager);
    assert!(matches!(manager.reset_log_status(), Err(NvlogError::Sequencing(_))));
    assert!(matches!(manager.reset_frontend_loggers(), Err(NvlogError::Sequencing(_))));
    manager.end_logging().unwrap();
    manager.reset_log_status().unwrap();
}

#[test]
fn test_end_logging_twice() {
    let (_temp, _path, manager) = setup_manager();
    assert!(!manager.end_logging().unwrap());

    recover_to_logging(&manager);
    assert!(manager.end_logging().unwrap());
    assert!(!manager.end_logging().unwrap());
    assert_eq!(manager.logging_mode(), LoggingMode::Sleeping);
}

// =============================================================================
// Mode Waits
// =============================================================================

#[test]
fn test_wait_for_unreachable_mode_fails_fast() {
    let (_temp, _path, manager) = setup_manager();
    recover_to_logging(&manager);

    let result = manager.wait_for_mode_transition(LoggingMode::Standby, true);
    assert!(matches!(result, Err(NvlogError::Sequencing(_))));
    manager.end_logging().unwrap();
}

#[test]
fn test_wait_for_mode_from_another_thread() {
    let (_temp, _path, manager) = setup_manager();
    let manager = Arc::new(manager);

    let waiter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.wait_for_mode_transition(LoggingMode::Sleeping, true))
    };

    recover_to_logging(&manager);
    manager.end_logging().unwrap();
    waiter.join().unwrap().unwrap();
}

#[test]
fn test_wait_for_mode_to_change() {
    let (_temp, _path, manager) = setup_manager();
    manager.start_standby_mode().unwrap();
    let manager = Arc::new(manager);

    let waiter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.wait_for_mode_transition(LoggingMode::Standby, false))
    };

    thread::sleep(Duration::from_millis(20));
    manager.start_logging_mode().unwrap();
    waiter.join().unwrap().unwrap();
    manager.end_logging().unwrap();
}

#[test]
fn test_cancelled_wait() {
    let (_temp, _path, manager) = setup_manager();
    let manager = Arc::new(manager);
    let token = CancellationToken::new();

    let waiter = {
        let manager = Arc::clone(&manager);
        let token = token.clone();
        thread::spawn(move || manager.wait_for_mode_transition_with(LoggingMode::Logging, true, &token))
    };

    thread::sleep(Duration::from_millis(20));
    token.cancel();
    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(NvlogError::Cancelled)));
    assert_eq!(manager.logging_mode(), LoggingMode::Invalid);
}

// =============================================================================
// Backend Registration
// =============================================================================

#[test]
fn test_backend_requires_frontend() {
    let (_temp, _path, manager) = setup_manager();
    assert!(matches!(manager.backend_logger(), Err(NvlogError::Sequencing(_))));

    manager.start_standby_mode().unwrap();
    let first = manager.backend_logger().unwrap();
    let second = manager.backend_logger().unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(manager.backend_count(), 2);
    manager.end_logging().unwrap();
}

#[test]
fn test_backend_detached_after_end_logging() {
    let (_temp, _path, manager) = setup_manager();
    recover_to_logging(&manager);
    let logger = manager.backend_logger().unwrap();
    manager.end_logging().unwrap();

    let result = logger.append(LogRecord::insert(1, TupleLocator::new(1, 1), b"late".to_vec()));
    assert!(matches!(result, Err(NvlogError::Sequencing(_))));
    assert!(matches!(manager.backend_logger(), Err(NvlogError::Sequencing(_))));
}

#[test]
fn test_backend_refuses_appends_before_logging() {
    let (_temp, _path, manager) = setup_manager();
    manager.start_standby_mode().unwrap();
    let logger = manager.backend_logger().unwrap();

    let result = logger.append(LogRecord::begin(1));
    assert!(matches!(result, Err(NvlogError::Sequencing(_))));
    assert_eq!(logger.pending_records(), 0);

    manager.start_logging_mode().unwrap();
    logger.append(LogRecord::begin(1)).unwrap();
    manager.end_logging().unwrap();
}

#[test]
fn test_recovered_txn_ids_are_not_reused() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ids.log");
    let config = config_at(&path, LoggingStrategy::WriteAhead, CommitMode::Synchronous);
    {
        let manager = LogManager::new(config.clone(), Arc::new(TableStore::new())).unwrap();
        recover_to_logging(&manager);
        let txns = TransactionManager::new(Arc::clone(manager.storage()));
        let logger = manager.backend_logger().unwrap();
        for key in 1..=3u64 {
            let mut txn = txns.begin(&logger).unwrap();
            txn.insert(1, key.to_le_bytes().to_vec()).unwrap();
            txn.commit().unwrap();
        }
        manager.end_logging().unwrap();
    }

    let store = Arc::new(TableStore::new());
    let manager = LogManager::new(config, store.clone()).unwrap();
    manager.start_standby_mode().unwrap();
    let txns = TransactionManager::new(Arc::clone(manager.storage()));
    let logger = manager.backend_logger().unwrap();

    // Too early: replay has not advanced the counters yet
    assert!(matches!(txns.begin(&logger), Err(NvlogError::Sequencing(_))));
    assert_eq!(store.next_txn_id(), 1);

    manager.prepare_recovery().unwrap();
    manager.start_recovery_mode().unwrap();
    manager.wait_for_mode_transition(LoggingMode::Logging, true).unwrap();

    let txn = txns.begin(&logger).unwrap();
    assert_eq!(txn.id(), 4);
    txn.abort().unwrap();
    manager.end_logging().unwrap();
}

#[test]
fn test_end_logging_drains_buffers() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("drain.log");
    let config = Config::builder()
        .log_path(&path)
        .commit_mode(CommitMode::Asynchronous)
        .flush_period(Duration::from_secs(60))
        .build();
    let manager = LogManager::new(config, Arc::new(TableStore::new())).unwrap();
    manager.start_standby_mode().unwrap();
    manager.start_logging_mode().unwrap();

    let logger = manager.backend_logger().unwrap();
    for txn in 1..=10 {
        logger.append(LogRecord::begin(txn)).unwrap();
        assert_eq!(logger.commit(txn).unwrap(), None);
    }
    assert_eq!(logger.pending_records(), 20);
    assert_eq!(manager.durable_lsn(), 0);

    manager.end_logging().unwrap();
    assert_eq!(manager.durable_lsn(), 20);
    assert_eq!(manager.flush_stats().records, 20);
    assert!(manager.log_file_size().unwrap() > 0);
}

#[test]
fn test_drop_with_live_frontend_flushes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("dropped.log");
    {
        let config = Config::builder()
            .log_path(&path)
            .commit_mode(CommitMode::Asynchronous)
            .flush_period(Duration::from_secs(60))
            .build();
        let manager = LogManager::new(config, Arc::new(TableStore::new())).unwrap();
        manager.start_standby_mode().unwrap();
        manager.start_logging_mode().unwrap();
        let logger = manager.backend_logger().unwrap();
        logger.commit(1).unwrap();
    }

    let records: Vec<_> = nvlog::logfile::LogReader::open(&path)
        .unwrap()
        .records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
}

// =============================================================================
// Durability Failures
// =============================================================================

#[test]
fn test_durability_failure_moves_to_failed() {
    let full = Path::new("/dev/full");
    if !full.exists() {
        return;
    }

    let config = config_at(full, LoggingStrategy::WriteAhead, CommitMode::Synchronous);
    let manager = LogManager::new(config, Arc::new(TableStore::new())).unwrap();
    manager.start_standby_mode().unwrap();
    manager.start_logging_mode().unwrap();

    let logger = manager.backend_logger().unwrap();
    logger.append(LogRecord::begin(1)).unwrap();
    let result = logger.commit(1);

    let message = result.unwrap_err().to_string();
    assert_eq!(message.matches("Durability error").count(), 1, "{}", message);
    assert_eq!(manager.logging_mode(), LoggingMode::Failed);
    assert!(manager.failure().unwrap().starts_with("writing log batch failed"));

    // Later appends see the failure, not a sequencing error
    let late = logger.append(LogRecord::begin(2));
    assert!(matches!(late, Err(NvlogError::Durability(_))));
    assert!(matches!(logger.probe(), Err(NvlogError::Durability(_))));
    assert!(matches!(
        manager.wait_for_mode_transition(LoggingMode::Sleeping, true),
        Err(NvlogError::Durability(_))
    ));
    assert!(matches!(manager.end_logging(), Err(NvlogError::Durability(_))));

    // A failed manager can be reset and pointed somewhere healthy
    let temp = TempDir::new().unwrap();
    manager.reset_log_status().unwrap();
    manager.reset_frontend_loggers().unwrap();
    manager.set_log_file_name(temp.path().join("healthy.log")).unwrap();
    recover_to_logging(&manager);
    assert!(manager.end_logging().unwrap());
}
