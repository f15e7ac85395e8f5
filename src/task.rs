// src/task.rs

//! Datapoint tasks, their per-batch state machine and terminal outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::errors::{Result, SimbatchError};

/// Datapoint index; also the suffix of the `datapoint-{index}` directory.
pub type TaskId = u32;

/// Name of the captured stdout log inside a datapoint directory.
pub const STDOUT_LOG: &str = "simulation_stdout.log";
/// Name of the captured stderr log inside a datapoint directory.
pub const STDERR_LOG: &str = "simulation_stderr.log";

/// Per-batch state of a datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Planned for execution, not started yet.
    Pending,
    /// Completion artifacts were present and the resume policy said skip.
    SkippedExisting,
    /// The simulation process has been (or is being) launched.
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, SkippedExisting)
                | (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// One simulation run and its dedicated working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DatapointTask {
    pub id: TaskId,
    pub dir: PathBuf,
    status: TaskStatus,
}

impl DatapointTask {
    pub fn new(id: TaskId, dir: PathBuf) -> Self {
        Self {
            id,
            dir,
            status: TaskStatus::Pending,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Move the task to `next`.
    ///
    /// Only forward transitions are accepted; on error the status is left
    /// untouched.
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SimbatchError::Other(anyhow::anyhow!(
                "illegal status transition for datapoint {}: {:?} -> {:?}",
                self.id,
                self.status,
                next
            )));
        }
        debug!(task = self.id, from = ?self.status, to = ?next, "status transition");
        self.status = next;
        Ok(())
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.dir.join(STDOUT_LOG)
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.dir.join(STDERR_LOG)
    }
}

/// `outputRoot/datapoint-{index}`.
pub fn datapoint_dir(output_root: &Path, id: TaskId) -> PathBuf {
    output_root.join(format!("datapoint-{id}"))
}

/// Why a datapoint failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// The process could not be started at all.
    Launch(String),
    /// The process exited with a nonzero code.
    NonZeroExit,
    /// The process was terminated by a signal and has no exit code.
    Signal,
    /// Reading output or writing the logs failed.
    Io(String),
    /// No stdout line arrived within the configured idle timeout.
    TimedOut(Duration),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Launch(reason) => write!(f, "launch failed: {reason}"),
            FailureCause::NonZeroExit => write!(f, "nonzero exit"),
            FailureCause::Signal => write!(f, "terminated by signal"),
            FailureCause::Io(reason) => write!(f, "io error: {reason}"),
            FailureCause::TimedOut(after) => write!(f, "no output for {after:?}"),
        }
    }
}

/// Diagnostics kept for a failed datapoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub exit_code: Option<i32>,
    pub cause: FailureCause,
    pub command_line: String,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// Terminal record for a datapoint.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded,
    Failed(FailureReport),
    SkippedExisting,
    Cancelled,
}

impl RunOutcome {
    /// Status a task ends in after producing this outcome.
    pub fn status(&self) -> TaskStatus {
        match self {
            RunOutcome::Succeeded => TaskStatus::Succeeded,
            RunOutcome::Failed(_) => TaskStatus::Failed,
            RunOutcome::SkippedExisting => TaskStatus::SkippedExisting,
            RunOutcome::Cancelled => TaskStatus::Cancelled,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Failed(report) => report.exit_code,
            _ => None,
        }
    }
}

/// Ordered per-datapoint outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub outcomes: BTreeMap<TaskId, RunOutcome>,
    /// Datapoints that never started because a sequential batch aborted.
    pub not_started: Vec<TaskId>,
}

impl BatchResult {
    pub fn get(&self, id: TaskId) -> Option<&RunOutcome> {
        self.outcomes.get(&id)
    }

    pub fn failed(&self) -> impl Iterator<Item = (TaskId, &FailureReport)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            RunOutcome::Failed(report) => Some((*id, report)),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RunOutcome::Cancelled))
            .map(|(id, _)| *id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RunOutcome::Succeeded))
            .map(|(id, _)| *id)
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
            && self.cancelled().next().is_none()
            && self.not_started.is_empty()
    }

    /// Turn the result into an error summary when anything went wrong.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(SimbatchError::BatchFailed {
            failed: self.failed().count(),
            cancelled: self.cancelled().count(),
        })
    }
}
