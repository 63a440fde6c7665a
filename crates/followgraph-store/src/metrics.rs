//! Storage backend metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Storage operation metrics
#[derive(Debug, Default)]
pub struct StoreMetrics {
    // Read metrics
    read_count: AtomicU64,
    read_latency_us: AtomicU64,
    read_errors: AtomicU64,

    // Write metrics (create + update)
    write_count: AtomicU64,
    write_latency_us: AtomicU64,
    write_errors: AtomicU64,
    version_conflicts: AtomicU64,

    // Delete metrics
    delete_count: AtomicU64,
    delete_errors: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read operation
    pub fn record_read(&self, duration: Duration, error: bool) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.read_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a write (create or conditional update)
    pub fn record_write(&self, duration: Duration, error: bool) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rejected conditional update
    pub fn record_version_conflict(&self) {
        self.version_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delete operation
    pub fn record_delete(&self, error: bool) {
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        if error {
            self.delete_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a point-in-time snapshot of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let read_count = self.read_count.load(Ordering::Relaxed);
        let write_count = self.write_count.load(Ordering::Relaxed);

        MetricsSnapshot {
            read_count,
            read_errors: self.read_errors.load(Ordering::Relaxed),
            avg_read_latency_us: if read_count > 0 {
                self.read_latency_us.load(Ordering::Relaxed) / read_count
            } else {
                0
            },
            write_count,
            write_errors: self.write_errors.load(Ordering::Relaxed),
            avg_write_latency_us: if write_count > 0 {
                self.write_latency_us.load(Ordering::Relaxed) / write_count
            } else {
                0
            },
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of storage metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub read_count: u64,
    pub read_errors: u64,
    pub avg_read_latency_us: u64,
    pub write_count: u64,
    pub write_errors: u64,
    pub avg_write_latency_us: u64,
    pub version_conflicts: u64,
    pub delete_count: u64,
    pub delete_errors: u64,
}
