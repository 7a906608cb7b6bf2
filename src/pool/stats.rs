use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Up/down gauge that remembers its highest observed value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
    high_water: AtomicU64,
}

impl Gauge {
    pub fn inc(&self) {
        let now = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn high_water(&self) -> u64 {
        self.high_water.load(Ordering::SeqCst)
    }
}

/// Live counters shared by the poll loop and the workers.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub receive_calls: Counter,
    pub receive_errors: Counter,
    pub received: Counter,
    /// Fetched but never handed to a worker because shutdown interrupted the push.
    pub abandoned: Counter,
    pub processed: Counter,
    pub failed: Counter,
    pub deleted: Counter,
    pub delete_errors: Counter,
    /// Messages sitting in the work channel.
    pub depth: Gauge,
    /// Processor invocations currently running.
    pub in_flight: Gauge,
}

impl PoolStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            receive_calls: self.receive_calls.get(),
            receive_errors: self.receive_errors.get(),
            received: self.received.get(),
            abandoned: self.abandoned.get(),
            processed: self.processed.get(),
            failed: self.failed.get(),
            deleted: self.deleted.get(),
            delete_errors: self.delete_errors.get(),
            depth: self.depth.get(),
            depth_high_water: self.depth.high_water(),
            in_flight: self.in_flight.get(),
            in_flight_high_water: self.in_flight.high_water(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub receive_calls: u64,
    pub receive_errors: u64,
    pub received: u64,
    pub abandoned: u64,
    pub processed: u64,
    pub failed: u64,
    pub deleted: u64,
    pub delete_errors: u64,
    pub depth: u64,
    pub depth_high_water: u64,
    pub in_flight: u64,
    pub in_flight_high_water: u64,
}
