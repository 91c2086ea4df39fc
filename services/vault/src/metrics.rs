//! Service counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use types::{ErrorClass, VaultError};

/// Thread-safe counters for vault actions
#[derive(Debug)]
pub struct VaultMetrics {
    start_time: Instant,
    plans_built: AtomicU64,
    plans_committed: AtomicU64,
    plans_unchanged: AtomicU64,
    conversions_executed: AtomicU64,
    emergency_withdrawals: AtomicU64,
    input_errors: AtomicU64,
    market_errors: AtomicU64,
    integrity_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VaultMetricsSnapshot {
    pub plans_built: u64,
    pub plans_committed: u64,
    pub plans_unchanged: u64,
    pub conversions_executed: u64,
    pub emergency_withdrawals: u64,
    pub input_errors: u64,
    pub market_errors: u64,
    pub integrity_errors: u64,
}

impl VaultMetricsSnapshot {
    pub fn failures(&self) -> u64 {
        self.input_errors + self.market_errors + self.integrity_errors
    }
}

impl VaultMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            plans_built: AtomicU64::new(0),
            plans_committed: AtomicU64::new(0),
            plans_unchanged: AtomicU64::new(0),
            conversions_executed: AtomicU64::new(0),
            emergency_withdrawals: AtomicU64::new(0),
            input_errors: AtomicU64::new(0),
            market_errors: AtomicU64::new(0),
            integrity_errors: AtomicU64::new(0),
        }
    }

    pub fn increment_plans_built(&self) {
        self.plans_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_committed(&self) {
        self.plans_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_unchanged(&self) {
        self.plans_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_conversions(&self, count: usize) {
        self.conversions_executed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn increment_emergency_withdrawals(&self) {
        self.emergency_withdrawals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &VaultError) {
        let counter = match error.class() {
            ErrorClass::InputConfig => &self.input_errors,
            ErrorClass::MarketCondition => &self.market_errors,
            ErrorClass::Integrity => &self.integrity_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VaultMetricsSnapshot {
        VaultMetricsSnapshot {
            plans_built: self.plans_built.load(Ordering::Relaxed),
            plans_committed: self.plans_committed.load(Ordering::Relaxed),
            plans_unchanged: self.plans_unchanged.load(Ordering::Relaxed),
            conversions_executed: self.conversions_executed.load(Ordering::Relaxed),
            emergency_withdrawals: self.emergency_withdrawals.load(Ordering::Relaxed),
            input_errors: self.input_errors.load(Ordering::Relaxed),
            market_errors: self.market_errors.load(Ordering::Relaxed),
            integrity_errors: self.integrity_errors.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}
