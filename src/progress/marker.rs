// src/progress/marker.rs

use std::sync::LazyLock;

use regex::Regex;

use crate::task::TaskId;

/// Simulated time every datapoint runs to, in the simulation's time unit.
pub const TOTAL_SIMULATED_DURATION: f64 = 27.5;

static PROGRESS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Time=\s*([\d.eE+\-]+)").expect("progress marker regex is valid")
});

/// Simulated time reported by one datapoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub task: TaskId,
    pub sim_time: f64,
}

/// Simulated time carried by a stdout line, if any.
///
/// Lines without the marker, and markers whose token is not a finite
/// number, yield `None`.
pub fn parse_progress(line: &str) -> Option<f64> {
    let caps = PROGRESS_MARKER.captures(line)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    value.is_finite().then_some(value)
}

/// `min(value, total) / total`, clamped to `[0, 1]`.
pub fn fraction_complete(value: f64, total: f64) -> f64 {
    if total <= 0.0 || value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, total) / total
}
