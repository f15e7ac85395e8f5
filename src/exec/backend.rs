// src/exec/backend.rs

//! Pluggable task runner abstraction.
//!
//! The batch executor talks to a `TaskRunner` instead of spawning processes
//! itself. Production code uses [`ProcessRunner`](super::ProcessRunner);
//! tests can provide a runner that scripts outcomes without touching the OS.

use std::future::Future;
use std::pin::Pin;

use crate::exec::cancel::CancelSignal;
use crate::progress::ProgressTracker;
use crate::task::{DatapointTask, RunOutcome};

/// Everything a runner gets besides the datapoint itself.
#[derive(Debug)]
pub struct RunContext {
    /// Shared batch progress; samples for this datapoint go here.
    pub tracker: ProgressTracker,
    /// Fires when this datapoint is cancelled.
    pub cancel: CancelSignal,
}

/// Drives one datapoint from launch to a terminal [`RunOutcome`].
///
/// The returned future owns everything it needs so the executor can move it
/// onto a Tokio worker. A runner never returns `Pending`/`Running`-like
/// outcomes and never panics on process failure: failures are values.
pub trait TaskRunner: Send + Sync + 'static {
    fn run_task(
        &self,
        task: DatapointTask,
        ctx: RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'static>>;

    /// Command line shown in diagnostics produced outside the runner.
    fn command_line(&self) -> String;
}
