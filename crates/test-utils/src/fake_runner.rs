use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use simbatch::exec::{RunContext, TaskRunner};
use simbatch::progress::ProgressSample;
use simbatch::task::{DatapointTask, FailureCause, FailureReport, RunOutcome, TaskId};

/// What a scripted datapoint does when it runs.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Simulated-time values reported before finishing.
    pub progress: Vec<f64>,
    /// `None` = exit 0.
    pub exit_code: Option<i32>,
    /// Pause before finishing; cancellation is honoured during it.
    pub delay: Duration,
    /// Panic inside the worker instead of returning an outcome.
    pub panics: bool,
}

impl Script {
    pub fn succeed() -> Self {
        Self::default()
    }

    pub fn fail(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, values: &[f64]) -> Self {
        self.progress = values.to_vec();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A fake runner that:
/// - records which datapoints were started, in start order
/// - tracks the peak number of simultaneously running datapoints
/// - finishes each datapoint according to its [`Script`]
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    scripts: Arc<HashMap<TaskId, Script>>,
    started: Arc<Mutex<Vec<TaskId>>>,
    running: Arc<Mutex<(usize, usize)>>,
}

impl FakeRunner {
    pub fn new(scripts: HashMap<TaskId, Script>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of datapoints that were running at the same time.
    pub fn peak_parallelism(&self) -> usize {
        self.running.lock().unwrap().1
    }
}

impl TaskRunner for FakeRunner {
    fn run_task(
        &self,
        task: DatapointTask,
        ctx: RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'static>> {
        let script = self.scripts.get(&task.id).cloned().unwrap_or_default();
        let started = Arc::clone(&self.started);
        let running = Arc::clone(&self.running);
        let command_line = self.command_line();

        Box::pin(async move {
            let RunContext { tracker, mut cancel } = ctx;
            started.lock().unwrap().push(task.id);
            if script.panics {
                panic!("scripted panic in datapoint {}", task.id);
            }
            {
                let mut guard = running.lock().unwrap();
                guard.0 += 1;
                guard.1 = guard.1.max(guard.0);
            }

            for sim_time in &script.progress {
                tracker.record(ProgressSample {
                    task: task.id,
                    sim_time: *sim_time,
                });
                tokio::task::yield_now().await;
            }

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(script.delay) => false,
                _ = cancel.cancelled() => true,
            };

            running.lock().unwrap().0 -= 1;

            if cancelled {
                return RunOutcome::Cancelled;
            }
            match script.exit_code {
                None | Some(0) => RunOutcome::Succeeded,
                Some(code) => RunOutcome::Failed(FailureReport {
                    exit_code: Some(code),
                    cause: FailureCause::NonZeroExit,
                    command_line,
                    stdout_log: task.stdout_log(),
                    stderr_log: task.stderr_log(),
                }),
            }
        })
    }

    fn command_line(&self) -> String {
        "fake-simulation".to_string()
    }
}

/// Pending datapoint `id` under `root`.
pub fn pending_task(root: &str, id: TaskId) -> DatapointTask {
    DatapointTask::new(id, PathBuf::from(root).join(format!("datapoint-{id}")))
}
