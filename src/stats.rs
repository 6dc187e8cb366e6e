//! Lock-free counters for coordinator outcomes.
//!
//! Relaxed ordering throughout; the numbers are for status reporting only.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CoordinatorStats {
    invocations: AtomicU64,
    cooldown_skips: AtomicU64,
    busy_skips: AtomicU64,
    store_errors: AtomicU64,
    not_triggered: AtomicU64,
    dispatch_successes: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cooldown_skip(&self) {
        self.cooldown_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn busy_skip(&self) {
        self.busy_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn not_triggered(&self) {
        self.not_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatch(&self, success: bool) {
        if success {
            self.dispatch_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MonitorStats {
        MonitorStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            cooldown_skips: self.cooldown_skips.load(Ordering::Relaxed),
            busy_skips: self.busy_skips.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            not_triggered: self.not_triggered.load(Ordering::Relaxed),
            dispatch_successes: self.dispatch_successes.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub invocations: u64,
    pub cooldown_skips: u64,
    pub busy_skips: u64,
    pub store_errors: u64,
    pub not_triggered: u64,
    pub dispatch_successes: u64,
    pub dispatch_failures: u64,
}

impl MonitorStats {
    pub fn dispatches(&self) -> u64 {
        self.dispatch_successes + self.dispatch_failures
    }
}
