//! Trial workload
//!
//! One table of `scale_factor` rows: an integer key followed by alternating
//! decimal and varchar columns.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::Result;
use crate::logging::LogManager;
use crate::storage::{TableId, TupleLocator};
use crate::txn::TransactionManager;
use crate::value::{encode_tuple, Decimal, Value, ValueType};

use super::TrialConfig;

/// Table every trial loads into
pub const TABLE_ID: TableId = 1;

const VARCHAR_LEN: usize = 16;

/// Column types for `column_count` columns
pub fn row_schema(column_count: usize) -> Vec<ValueType> {
    (0..column_count)
        .map(|i| match i {
            0 => ValueType::Integer,
            i if i % 2 == 1 => ValueType::Decimal,
            _ => ValueType::Varchar,
        })
        .collect()
}

/// A random row with key `key`
pub fn build_row<R: Rng>(rng: &mut R, key: i32, column_count: usize) -> Vec<Value> {
    row_schema(column_count)
        .into_iter()
        .map(|ty| match ty {
            ValueType::Integer => Value::Integer(key),
            ValueType::Decimal => {
                // Within 26 integer digits for any i64
                let whole = rng.gen_range(-1_000_000i64..1_000_000);
                let unscaled = whole as i128 * 1_000_000_000_000 + rng.gen_range(0..1_000_000_000_000i128);
                Value::Decimal(Decimal::from_unscaled(unscaled).unwrap_or(Decimal::ZERO))
            }
            _ => Value::Varchar(
                (0..VARCHAR_LEN)
                    .map(|_| rng.gen_range(b'a'..=b'z') as char)
                    .collect(),
            ),
        })
        .collect()
}

/// Counters from the timed phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStats {
    pub committed: u64,
    pub aborted: u64,
    pub updates: u64,
    pub reads: u64,
    pub elapsed: Duration,
}

/// The loaded table and the transaction manager driving it
pub struct Workload<'a> {
    manager: &'a LogManager,
    txns: TransactionManager,
    config: TrialConfig,
    locators: Vec<TupleLocator>,
}

impl<'a> Workload<'a> {
    pub fn new(manager: &'a LogManager, config: TrialConfig) -> Self {
        let txns = TransactionManager::new(manager.storage().clone());
        Self {
            manager,
            txns,
            config,
            locators: Vec::new(),
        }
    }

    pub fn locators(&self) -> &[TupleLocator] {
        &self.locators
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.txns
    }

    /// Insert `scale_factor` rows, one transaction per row
    pub fn load(&mut self) -> Result<()> {
        let logger = self.manager.backend_logger()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.locators.reserve(self.config.scale_factor);

        for key in 0..self.config.scale_factor {
            let row = build_row(&mut rng, key as i32, self.config.column_count);
            let mut txn = self.txns.begin(&logger)?;
            let locator = txn.insert(TABLE_ID, encode_tuple(&row)?)?;
            txn.commit()?;
            self.locators.push(locator);
        }

        info!(rows = self.locators.len(), "table loaded");
        Ok(())
    }

    /// Run `backend_count` workers until `duration` elapses
    pub fn run(&self) -> Result<WorkloadStats> {
        self.txns.reset_states();
        let deadline = Instant::now() + self.config.duration;
        let started = Instant::now();

        let results: Vec<Result<WorkloadStats>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.backend_count)
                .map(|worker| scope.spawn(move || self.worker(worker, deadline)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(crate::error::NvlogError::Storage(
                        "workload worker panicked".to_string(),
                    )),
                })
                .collect()
        });

        let mut total = WorkloadStats::default();
        for result in results {
            let stats = result?;
            total.updates += stats.updates;
            total.reads += stats.reads;
        }
        total.committed = self.txns.committed();
        total.aborted = self.txns.aborted();
        total.elapsed = started.elapsed();

        info!(
            committed = total.committed,
            aborted = total.aborted,
            elapsed_ms = total.elapsed.as_millis() as u64,
            "workload finished"
        );
        Ok(total)
    }

    fn worker(&self, worker: usize, deadline: Instant) -> Result<WorkloadStats> {
        let logger = self.manager.backend_logger()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(worker as u64 + 1));
        let mut stats = WorkloadStats::default();

        while Instant::now() < deadline {
            let locator = self.locators[rng.gen_range(0..self.locators.len())];
            let mut txn = self.txns.begin(&logger)?;
            if rng.gen_bool(self.config.update_ratio) {
                let row = build_row(&mut rng, locator.tuple_id as i32, self.config.column_count);
                txn.update(locator, encode_tuple(&row)?)?;
                stats.updates += 1;
            } else {
                let _ = txn.read(locator);
                stats.reads += 1;
            }
            txn.commit()?;
        }

        debug!(worker, updates = stats.updates, reads = stats.reads, "worker done");
        Ok(stats)
    }
}
