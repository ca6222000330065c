//! Atomic performance counters
//!
//! Counts calls, errors and timeouts and accumulates execution time.
//! Cheap enough to share across every worker and scheduler; read with
//! [`PerformanceMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub total_duration_ms: u64,
}

impl MetricsSnapshot {
    /// Mean execution time per call, in milliseconds.
    #[must_use]
    pub fn avg_duration_ms(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_duration_ms / self.calls
        }
    }
}

/// Shared atomic counters.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    calls: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl PerformanceMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
        }
    }
}
