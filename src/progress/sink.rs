// src/progress/sink.rs

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::info;

/// External consumer of the aggregate batch percentage.
///
/// Called on every progress update while the tracker holds its lock, so
/// implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

/// Default sink; drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _percent: f64) {}
}

/// Logs the aggregate through `tracing` whenever it crosses a whole percent.
#[derive(Debug)]
pub struct LogSink {
    last_whole: AtomicI64,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            last_whole: AtomicI64::new(-1),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogSink {
    fn report(&self, percent: f64) {
        let whole = percent.floor() as i64;
        if self.last_whole.swap(whole, Ordering::Relaxed) != whole {
            info!(percent = whole, "batch progress");
        }
    }
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}
