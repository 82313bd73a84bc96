//! Flush metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated by the frontend logger after every flushed batch
#[derive(Debug, Default)]
pub(crate) struct FlushStats {
    flushes: AtomicU64,
    records: AtomicU64,
    bytes: AtomicU64,
    total_latency_nanos: AtomicU64,
    max_latency_nanos: AtomicU64,
    max_batch_records: AtomicU64,
}

impl FlushStats {
    pub(crate) fn record(&self, records: usize, bytes: u64, latency: Duration) {
        let nanos = latency.as_nanos().min(u64::MAX as u128) as u64;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.total_latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_latency_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.max_batch_records.fetch_max(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            total_latency: Duration::from_nanos(self.total_latency_nanos.load(Ordering::Relaxed)),
            max_latency: Duration::from_nanos(self.max_latency_nanos.load(Ordering::Relaxed)),
            max_batch_records: self.max_batch_records.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the flush counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    /// Non-empty batches written
    pub flushes: u64,
    /// Records written
    pub records: u64,
    /// Bytes written, header included
    pub bytes: u64,
    /// Time spent persisting, delaying and writing batches
    pub total_latency: Duration,
    pub max_latency: Duration,
    pub max_batch_records: u64,
}

impl FlushStatsSnapshot {
    /// Mean time per flushed batch
    pub fn mean_latency(&self) -> Duration {
        if self.flushes == 0 {
            return Duration::ZERO;
        }
        self.total_latency / self.flushes as u32
    }
}
