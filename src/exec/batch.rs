// src/exec/batch.rs

//! Batch executor: runs every planned datapoint under a scheduling policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::exec::backend::{RunContext, TaskRunner};
use crate::exec::cancel::{CancelHandle, CancelSignal};
use crate::plan::Plan;
use crate::progress::ProgressTracker;
use crate::task::{
    BatchResult, DatapointTask, FailureCause, FailureReport, RunOutcome, TaskId, TaskStatus,
};
use crate::types::SchedulingPolicy;

/// Schedules datapoints onto a [`TaskRunner`] and collects their outcomes.
///
/// - `Sequential`: one datapoint at a time in index order; the first failure
///   stops the batch and the remaining datapoints are reported as not
///   started.
/// - `Concurrent`: every datapoint gets its own Tokio task, gated by a
///   semaphore of `max_parallel` permits (`0` = unbounded). Failures stay
///   inside their datapoint; the executor waits for all of them.
pub struct BatchExecutor<R: TaskRunner> {
    runner: Arc<R>,
    tracker: ProgressTracker,
    cancel: CancelHandle,
}

impl<R: TaskRunner> std::fmt::Debug for BatchExecutor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl<R: TaskRunner> BatchExecutor<R> {
    pub fn new(runner: R, tracker: ProgressTracker) -> Self {
        Self {
            runner: Arc::new(runner),
            tracker,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle for cancelling datapoints while [`execute`](Self::execute)
    /// runs (e.g. from a Ctrl-C listener).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Run the plan and return once every submitted datapoint is terminal.
    pub async fn execute(
        &self,
        plan: Plan,
        max_parallel: usize,
        policy: SchedulingPolicy,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let mut runnable: Vec<(DatapointTask, CancelSignal)> = Vec::new();

        for task in plan.into_tasks() {
            match task.status() {
                TaskStatus::SkippedExisting => {
                    result.outcomes.insert(task.id, RunOutcome::SkippedExisting);
                }
                TaskStatus::Pending => {
                    let signal = self.cancel.register(task.id);
                    runnable.push((task, signal));
                }
                other => {
                    warn!(task = task.id, status = ?other, "unexpected status in plan; ignoring");
                }
            }
        }

        info!(
            runnable = runnable.len(),
            skipped = result.outcomes.len(),
            ?policy,
            max_parallel,
            "executing batch"
        );

        match policy {
            SchedulingPolicy::Sequential => self.run_sequential(runnable, &mut result).await,
            SchedulingPolicy::Concurrent => {
                self.run_concurrent(runnable, max_parallel, &mut result).await
            }
        }

        info!(
            succeeded = result.succeeded().count(),
            failed = result.failed().count(),
            cancelled = result.cancelled().count(),
            not_started = result.not_started.len(),
            "batch finished"
        );
        result
    }

    async fn run_sequential(
        &self,
        runnable: Vec<(DatapointTask, CancelSignal)>,
        result: &mut BatchResult,
    ) {
        let mut aborted_by: Option<TaskId> = None;

        for (task, signal) in runnable {
            if let Some(failed) = aborted_by {
                debug!(task = task.id, failed, "not starting datapoint after earlier failure");
                self.cancel.release(task.id);
                result.not_started.push(task.id);
                continue;
            }

            let id = task.id;
            let dir = task.dir.clone();
            let worker = tokio::spawn(run_worker(
                Arc::clone(&self.runner),
                self.tracker.clone(),
                task,
                signal,
            ));
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(task = id, error = %join_err, "datapoint worker crashed");
                    self.crashed_outcome(id, dir, &join_err.to_string())
                }
            };
            self.cancel.release(id);

            if let RunOutcome::Failed(report) = &outcome {
                error!(
                    task = id,
                    cmd = %report.command_line,
                    stderr_log = %report.stderr_log.display(),
                    "datapoint failed; aborting sequential batch"
                );
                aborted_by = Some(id);
            }
            result.outcomes.insert(id, outcome);
        }
    }

    async fn run_concurrent(
        &self,
        runnable: Vec<(DatapointTask, CancelSignal)>,
        max_parallel: usize,
        result: &mut BatchResult,
    ) {
        let permits = (max_parallel > 0).then(|| Arc::new(Semaphore::new(max_parallel)));
        let mut workers: JoinSet<(TaskId, RunOutcome)> = JoinSet::new();
        let mut worker_ids: HashMap<tokio::task::Id, (TaskId, PathBuf)> = HashMap::new();

        for (task, mut signal) in runnable {
            let id = task.id;
            let dir = task.dir.clone();
            let runner = Arc::clone(&self.runner);
            let tracker = self.tracker.clone();
            let permits = permits.clone();

            let handle = workers.spawn(async move {
                // Hold the permit for the whole lifecycle of the datapoint.
                let _permit = match permits {
                    Some(sem) => {
                        tokio::select! {
                            permit = sem.acquire_owned() => match permit {
                                Ok(permit) => Some(permit),
                                Err(_) => return (id, RunOutcome::Cancelled),
                            },
                            _ = signal.cancelled() => {
                                info!(task = id, "cancelled while waiting for a worker slot");
                                return (id, RunOutcome::Cancelled);
                            }
                        }
                    }
                    None => None,
                };
                let outcome = run_worker(runner, tracker, task, signal).await;
                (id, outcome)
            });
            worker_ids.insert(handle.id(), (id, dir));
        }

        while let Some(joined) = workers.join_next().await {
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(join_err) => {
                    let Some((id, dir)) = worker_ids.remove(&join_err.id()) else {
                        error!(error = %join_err, "worker for unknown datapoint crashed");
                        continue;
                    };
                    error!(task = id, error = %join_err, "datapoint worker crashed");
                    (id, self.crashed_outcome(id, dir, &join_err.to_string()))
                }
            };
            self.cancel.release(id);

            if let RunOutcome::Failed(report) = &outcome {
                warn!(
                    task = id,
                    exit_code = ?report.exit_code,
                    stderr_log = %report.stderr_log.display(),
                    "datapoint failed; continuing with the rest of the batch"
                );
            }
            result.outcomes.insert(id, outcome);
        }
    }

    fn crashed_outcome(&self, id: TaskId, dir: PathBuf, reason: &str) -> RunOutcome {
        let task = DatapointTask::new(id, dir);
        RunOutcome::Failed(FailureReport {
            exit_code: None,
            cause: FailureCause::Io(format!("worker crashed: {reason}")),
            command_line: self.runner.command_line(),
            stdout_log: task.stdout_log(),
            stderr_log: task.stderr_log(),
        })
    }
}

/// One datapoint's full lifecycle: Pending -> Running -> terminal.
async fn run_worker<R: TaskRunner>(
    runner: Arc<R>,
    tracker: ProgressTracker,
    mut task: DatapointTask,
    mut cancel: CancelSignal,
) -> RunOutcome {
    if cancel.is_cancelled() {
        if let Err(e) = task.transition(TaskStatus::Cancelled) {
            warn!(task = task.id, error = %e, "could not record cancellation");
        }
        info!(task = task.id, "cancelled before start");
        return RunOutcome::Cancelled;
    }

    if let Err(e) = task.transition(TaskStatus::Running) {
        warn!(task = task.id, error = %e, "could not mark datapoint running");
    }

    let ctx = RunContext {
        tracker: tracker.clone(),
        cancel,
    };
    let outcome = runner.run_task(task.clone(), ctx).await;

    if outcome == RunOutcome::Succeeded {
        tracker.complete(task.id);
    }
    if let Err(e) = task.transition(outcome.status()) {
        warn!(task = task.id, error = %e, "runner returned a non-terminal outcome");
    }

    debug!(task = task.id, status = ?task.status(), "datapoint reached terminal state");
    outcome
}
