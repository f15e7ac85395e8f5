// src/exec/task_runner.rs

//! Individual simulation process runner.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::exec::backend::{RunContext, TaskRunner};
use crate::exec::cancel::CancelSignal;
use crate::exec::command::SimulationCommand;
use crate::exec::line_reader::{spawn_line_reader, LineResult};
use crate::progress::{parse_progress, ProgressSample, ProgressTracker};
use crate::task::{DatapointTask, FailureCause, FailureReport, RunOutcome};

/// How consuming stdout ended.
#[derive(Debug)]
enum StreamEnd {
    /// EOF; the process closed its stdout.
    Exhausted,
    Cancelled,
    TimedOut(Duration),
    Failed(io::Error),
}

/// How waiting for the process to exit ended.
enum Exited {
    Status(ExitStatus),
    Idle(Duration),
    Failed(io::Error),
}

/// Result of waiting for the next stdout line.
enum NextLine {
    Line(Vec<u8>),
    ReadError(io::Error),
    Closed,
    Idle(Duration),
}

/// Runs one simulation process per datapoint.
///
/// Cheap to clone; the launch configuration is shared read-only.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: Arc<SimulationConfig>,
    command: SimulationCommand,
}

impl ProcessRunner {
    pub fn new(config: Arc<SimulationConfig>) -> Self {
        let command = SimulationCommand::from_config(&config);
        Self { config, command }
    }

    pub fn command(&self) -> &SimulationCommand {
        &self.command
    }

    /// Run the simulation for `task` to a terminal outcome.
    ///
    /// Both log files are created before the process is spawned, so they
    /// exist for every outcome except an IO failure while creating them.
    pub async fn run(
        &self,
        task: &DatapointTask,
        tracker: &ProgressTracker,
        mut cancel: CancelSignal,
    ) -> RunOutcome {
        let command_line = self.command.command_line();
        info!(
            task = task.id,
            dir = %task.dir.display(),
            cmd = %command_line,
            "starting simulation process"
        );

        let (mut stdout_log, stderr_file) = match open_logs(task).await {
            Ok(logs) => logs,
            Err(e) => {
                error!(task = task.id, error = %e, "could not create simulation log files");
                return self.failure(task, None, FailureCause::Io(e.to_string()));
            }
        };

        if cancel.is_cancelled() {
            info!(task = task.id, "cancelled before launch");
            return RunOutcome::Cancelled;
        }

        let mut cmd = self.command.to_tokio(&task.dir);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true);
        // Own process group, so killing reaches MPI ranks and other children.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    task = task.id,
                    cmd = %command_line,
                    error = %e,
                    "failed to launch simulation process"
                );
                return self.failure(task, None, FailureCause::Launch(e.to_string()));
            }
        };
        drop(cmd);

        let Some(stdout) = child.stdout.take() else {
            kill(task, &mut child).await;
            return self.failure(
                task,
                None,
                FailureCause::Io("stdout pipe unavailable".to_string()),
            );
        };

        let (mut lines, reader) = spawn_line_reader(stdout, task.id);
        let streamed = self
            .consume_stdout(task, &mut lines, &mut stdout_log, tracker, &mut cancel)
            .await;

        if let Err(e) = stdout_log.flush().await {
            warn!(task = task.id, error = %e, "failed to flush stdout log");
        }

        match streamed {
            StreamEnd::Exhausted => {}
            StreamEnd::Cancelled => {
                info!(task = task.id, "cancellation requested; killing simulation process");
                kill(task, &mut child).await;
                reader.abort();
                return RunOutcome::Cancelled;
            }
            StreamEnd::TimedOut(after) => {
                error!(
                    task = task.id,
                    idle_for = ?after,
                    "simulation produced no output; killing process"
                );
                kill(task, &mut child).await;
                reader.abort();
                return self.failure(task, None, FailureCause::TimedOut(after));
            }
            StreamEnd::Failed(e) => {
                error!(task = task.id, error = %e, "reading simulation output failed");
                kill(task, &mut child).await;
                reader.abort();
                return self.failure(task, None, FailureCause::Io(e.to_string()));
            }
        }

        // Stream exhausted; the process is exiting. A process that closed
        // stdout but lingers is still subject to cancellation and the idle
        // timeout.
        let exited = tokio::select! {
            exited = wait_for_exit(&mut child, self.config.idle_timeout) => exited,
            _ = cancel.cancelled() => {
                info!(task = task.id, "cancellation requested after stdout closed; killing process");
                kill(task, &mut child).await;
                return RunOutcome::Cancelled;
            }
        };

        let status = match exited {
            Exited::Status(status) => status,
            Exited::Idle(after) => {
                error!(
                    task = task.id,
                    idle_for = ?after,
                    "simulation closed stdout but did not exit; killing process"
                );
                kill(task, &mut child).await;
                return self.failure(task, None, FailureCause::TimedOut(after));
            }
            Exited::Failed(e) => {
                error!(task = task.id, error = %e, "waiting for simulation process failed");
                kill(task, &mut child).await;
                return self.failure(task, None, FailureCause::Io(e.to_string()));
            }
        };

        info!(
            task = task.id,
            exit_code = ?status.code(),
            success = status.success(),
            "simulation process exited"
        );

        if status.success() {
            return RunOutcome::Succeeded;
        }

        error!(
            task = task.id,
            "There was an error during executing the command `{}`.",
            command_line
        );
        error!(
            task = task.id,
            "Please check the logs at '{}'",
            task.stderr_log().display()
        );
        match status.code() {
            Some(code) => self.failure(task, Some(code), FailureCause::NonZeroExit),
            None => self.failure(task, None, FailureCause::Signal),
        }
    }

    async fn consume_stdout(
        &self,
        task: &DatapointTask,
        lines: &mut mpsc::Receiver<LineResult>,
        log: &mut File,
        tracker: &ProgressTracker,
        cancel: &mut CancelSignal,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = next_line(lines, self.config.idle_timeout) => next,
            };

            let bytes = match next {
                NextLine::Line(bytes) => bytes,
                NextLine::Closed => return StreamEnd::Exhausted,
                NextLine::Idle(after) => return StreamEnd::TimedOut(after),
                NextLine::ReadError(e) => return StreamEnd::Failed(e),
            };

            if let Err(e) = log.write_all(&bytes).await {
                return StreamEnd::Failed(e);
            }

            let text = String::from_utf8_lossy(&bytes);
            if let Some(sim_time) = parse_progress(&text) {
                let percent = tracker.record(ProgressSample {
                    task: task.id,
                    sim_time,
                });
                debug!(task = task.id, sim_time, percent, "progress marker");
                if let Err(e) = log.flush().await {
                    return StreamEnd::Failed(e);
                }
            }
        }
    }

    fn failure(
        &self,
        task: &DatapointTask,
        exit_code: Option<i32>,
        cause: FailureCause,
    ) -> RunOutcome {
        RunOutcome::Failed(FailureReport {
            exit_code,
            cause,
            command_line: self.command.command_line(),
            stdout_log: task.stdout_log(),
            stderr_log: task.stderr_log(),
        })
    }
}

impl TaskRunner for ProcessRunner {
    fn run_task(
        &self,
        task: DatapointTask,
        ctx: RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'static>> {
        let runner = self.clone();
        Box::pin(async move { runner.run(&task, &ctx.tracker, ctx.cancel).await })
    }

    fn command_line(&self) -> String {
        self.command.command_line()
    }
}

/// Create the datapoint directory if needed and truncate both logs.
async fn open_logs(task: &DatapointTask) -> io::Result<(File, std::fs::File)> {
    tokio::fs::create_dir_all(&task.dir).await?;
    let stdout_log = File::create(task.stdout_log()).await?;
    let stderr_log = File::create(task.stderr_log()).await?.into_std().await;
    Ok((stdout_log, stderr_log))
}

async fn next_line(lines: &mut mpsc::Receiver<LineResult>, idle: Option<Duration>) -> NextLine {
    let received = match idle {
        Some(after) => match tokio::time::timeout(after, lines.recv()).await {
            Ok(received) => received,
            Err(_) => return NextLine::Idle(after),
        },
        None => lines.recv().await,
    };

    match received {
        Some(Ok(bytes)) => NextLine::Line(bytes),
        Some(Err(e)) => NextLine::ReadError(e),
        None => NextLine::Closed,
    }
}

async fn wait_for_exit(child: &mut Child, idle: Option<Duration>) -> Exited {
    let waited = match idle {
        Some(after) => match tokio::time::timeout(after, child.wait()).await {
            Ok(waited) => waited,
            Err(_) => return Exited::Idle(after),
        },
        None => child.wait().await,
    };
    match waited {
        Ok(status) => Exited::Status(status),
        Err(e) => Exited::Failed(e),
    }
}

/// Kill the simulation's process group, then the process itself.
async fn kill(task: &DatapointTask, child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(task, child);

    if let Err(e) = child.kill().await {
        warn!(
            task = task.id,
            error = %e,
            "failed to kill simulation process"
        );
    }
}

#[cfg(unix)]
fn kill_process_group(task: &DatapointTask, child: &Child) {
    let Some(pgid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the group the child leads since spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            task = task.id,
            pgid,
            error = %io::Error::last_os_error(),
            "could not signal simulation process group"
        );
    }
}
