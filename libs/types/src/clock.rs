//! Time source for staleness and cooldown checks
//!
//! All timestamps in the vault core are nanoseconds since the Unix epoch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Convert a whole number of seconds into nanoseconds, saturating
pub const fn secs_to_ns(secs: u64) -> u64 {
    secs.saturating_mul(NANOS_PER_SECOND)
}

pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs_to_ns(secs));
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
