// src/progress/tracker.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::trace;

use crate::progress::marker::{fraction_complete, ProgressSample, TOTAL_SIMULATED_DURATION};
use crate::progress::sink::{NoopSink, ProgressSink};
use crate::task::TaskId;

/// Point-in-time view of the aggregate, published to the display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub percent: f64,
    /// Datapoints whose fraction reached 1.0.
    pub finished: usize,
    pub task_count: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    fractions: HashMap<TaskId, f64>,
}

struct Inner {
    state: Mutex<TrackerState>,
    task_count: usize,
    total_duration: f64,
    sink: Arc<dyn ProgressSink>,
    snapshots: watch::Sender<ProgressSnapshot>,
}

/// Shared aggregate of per-datapoint progress.
///
/// Cheap to clone; every worker holds a handle. The per-task map is the
/// only cross-task mutable state of a batch and is only touched under the
/// mutex.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("task_count", &self.inner.task_count)
            .field("percent", &self.percent())
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Tracker for `task_count` datapoints that reports nowhere.
    pub fn new(task_count: usize) -> Self {
        Self::with_sink(task_count, Arc::new(NoopSink))
    }

    pub fn with_sink(task_count: usize, sink: Arc<dyn ProgressSink>) -> Self {
        let (snapshots, _) = watch::channel(ProgressSnapshot {
            task_count,
            ..ProgressSnapshot::default()
        });
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TrackerState::default()),
                task_count,
                total_duration: TOTAL_SIMULATED_DURATION,
                sink,
                snapshots,
            }),
        }
    }

    /// Record a simulated-time sample; returns the new aggregate percentage.
    pub fn record(&self, sample: ProgressSample) -> f64 {
        let fraction = fraction_complete(sample.sim_time, self.inner.total_duration);
        trace!(task = sample.task, sim_time = sample.sim_time, fraction, "progress sample");
        self.set_fraction(sample.task, fraction)
    }

    /// Mark a datapoint as fully done regardless of the last sample.
    pub fn complete(&self, task: TaskId) -> f64 {
        self.set_fraction(task, 1.0)
    }

    pub fn fraction_of(&self, task: TaskId) -> Option<f64> {
        self.lock().fractions.get(&task).copied()
    }

    pub fn percent(&self) -> f64 {
        self.snapshot_of(&self.lock()).percent
    }

    pub fn task_count(&self) -> usize {
        self.inner.task_count
    }

    /// Receiver for the single display consumer.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.inner.snapshots.subscribe()
    }

    fn set_fraction(&self, task: TaskId, fraction: f64) -> f64 {
        let mut state = self.lock();
        state.fractions.insert(task, fraction);

        let snapshot = self.snapshot_of(&state);
        self.inner.sink.report(snapshot.percent);
        self.inner.snapshots.send_replace(snapshot);
        snapshot.percent
    }

    fn snapshot_of(&self, state: &TrackerState) -> ProgressSnapshot {
        let task_count = self.inner.task_count;
        let percent = if task_count == 0 {
            100.0
        } else {
            let sum: f64 = state.fractions.values().sum();
            (sum / task_count as f64 * 100.0).min(100.0)
        };
        let finished = state.fractions.values().filter(|f| **f >= 1.0).count();
        ProgressSnapshot {
            percent,
            finished,
            task_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
