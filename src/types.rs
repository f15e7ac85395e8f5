use clap::ValueEnum;
use serde::Deserialize;

/// How the batch executor schedules datapoints.
///
/// - `Concurrent`: run up to `max_parallel` simulations at once; a failing
///   datapoint is recorded and the rest of the batch carries on (default).
/// - `Sequential`: run datapoints one at a time in index order and stop the
///   whole batch at the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicy {
    Sequential,
    Concurrent,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        SchedulingPolicy::Concurrent
    }
}

/// What to do with datapoints whose completion artifacts already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    /// Ask on the terminal for every completed datapoint.
    Ask,
    /// Never rerun completed datapoints.
    Skip,
    /// Always rerun completed datapoints.
    Rerun,
}

impl Default for ResumeMode {
    fn default() -> Self {
        ResumeMode::Ask
    }
}
