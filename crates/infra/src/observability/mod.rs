//! Lightweight observability for workers and schedulers

mod metrics;

pub use metrics::{MetricsSnapshot, PerformanceMetrics};
