// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod plan;
pub mod progress;
pub mod task;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{default_config_path, load_from_path, load_or_default, BatchConfig};
use crate::errors::{Result, SimbatchError};
use crate::exec::{BatchExecutor, ProcessRunner, SimulationCommand, TaskRunner};
use crate::fs::RealFileSystem;
use crate::plan::{policy_for_mode, Plan, TaskPlanner};
use crate::progress::{spawn_progress_display, LogSink, NoopSink, ProgressSink, ProgressTracker};
use crate::task::{BatchResult, FailureCause, RunOutcome, TaskStatus};
use crate::types::SchedulingPolicy;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading + CLI overrides
/// - planning (with the configured resume policy)
/// - the batch executor and the process runner
/// - progress display
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = match &args.config {
        Some(path) => load_from_path(path)?,
        None => load_or_default(default_config_path())?,
    };
    args.apply_overrides(&mut raw);
    let cfg = BatchConfig::try_from(raw)?;

    let resume = policy_for_mode(cfg.resume);
    let plan = TaskPlanner::new(&RealFileSystem, &cfg.artifacts).plan(
        cfg.number_datapoints,
        &cfg.output_directory,
        resume.as_ref(),
    )?;

    let runner = ProcessRunner::new(Arc::new(cfg.simulation.clone()));

    if args.dry_run {
        print_dry_run(&cfg, &plan, runner.command());
        return Ok(());
    }

    let result = run_batch(&cfg, plan, runner, !args.no_progress).await;
    print_report(&result);

    if cfg.policy == SchedulingPolicy::Sequential {
        if let Some(err) = first_error(&result) {
            return Err(err);
        }
    }
    result.ensure_success()
}

/// Execute a plan with the given runner, drawing progress if requested.
///
/// Ctrl-C cancels every datapoint; the batch still returns a full result.
pub async fn run_batch<R: TaskRunner>(
    cfg: &BatchConfig,
    plan: Plan,
    runner: R,
    show_progress: bool,
) -> BatchResult {
    let sink: Arc<dyn ProgressSink> = if show_progress {
        Arc::new(NoopSink)
    } else {
        Arc::new(LogSink::new())
    };
    let tracker = ProgressTracker::with_sink(plan.runnable_count(), sink);
    let display = show_progress.then(|| spawn_progress_display(tracker.subscribe()));

    let executor = BatchExecutor::new(runner, tracker);

    // Ctrl-C -> cancel all datapoints.
    let ctrl_c = {
        let cancel = executor.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling running simulations");
            cancel.cancel_all();
        })
    };

    let result = executor
        .execute(plan, cfg.max_parallel, cfg.policy)
        .await;

    ctrl_c.abort();
    // Dropping the executor drops the last tracker handle, which ends the
    // display task.
    drop(executor);
    if let Some(display) = display {
        if let Err(e) = display.await {
            debug!(error = %e, "progress display ended abnormally");
        }
    }

    result
}

/// First failure or cancellation of a batch as an error, in index order.
pub fn first_error(result: &BatchResult) -> Option<SimbatchError> {
    result.outcomes.iter().find_map(|(id, outcome)| match outcome {
        RunOutcome::Failed(report) => Some(match &report.cause {
            FailureCause::Launch(reason) => SimbatchError::Launch {
                task: *id,
                command: report.command_line.clone(),
                reason: reason.clone(),
            },
            _ => SimbatchError::ProcessFailure {
                task: *id,
                exit_code: report.exit_code,
                command: report.command_line.clone(),
                stderr_log: report.stderr_log.clone(),
            },
        }),
        RunOutcome::Cancelled => Some(SimbatchError::Cancelled(*id)),
        RunOutcome::Succeeded | RunOutcome::SkippedExisting => None,
    })
}

/// Dry-run output: the plan and the command each datapoint would run.
fn print_dry_run(cfg: &BatchConfig, plan: &Plan, command: &SimulationCommand) {
    println!("simbatch dry-run");
    println!("  output_directory = {}", cfg.output_directory.display());
    println!("  policy = {:?}", cfg.policy);
    println!("  max_parallel = {}", cfg.max_parallel);
    println!("  command = {}", command.command_line());
    if let Some(timeout) = cfg.simulation.idle_timeout {
        println!("  idle_timeout = {timeout:?}");
    }
    println!();

    println!("datapoints ({}):", plan.tasks().len());
    for task in plan.tasks() {
        let action = match task.status() {
            TaskStatus::SkippedExisting => "skip (already simulated)",
            _ => "run",
        };
        println!("  - datapoint-{}: {action}", task.id);
    }

    debug!("dry-run complete (no execution)");
}

/// Final per-datapoint report on stdout.
pub fn print_report(result: &BatchResult) {
    println!("simulation batch report:");
    for (id, outcome) in &result.outcomes {
        match outcome {
            RunOutcome::Succeeded => println!("  datapoint-{id}: succeeded"),
            RunOutcome::SkippedExisting => println!("  datapoint-{id}: skipped (already simulated)"),
            RunOutcome::Cancelled => println!("  datapoint-{id}: cancelled"),
            RunOutcome::Failed(report) => {
                match report.exit_code {
                    Some(code) => println!("  datapoint-{id}: FAILED (exit code {code})"),
                    None => println!("  datapoint-{id}: FAILED ({})", report.cause),
                }
                println!("      command: {}", report.command_line);
                println!("      stdout:  {}", report.stdout_log.display());
                println!("      stderr:  {}", report.stderr_log.display());
            }
        }
    }
    for id in &result.not_started {
        println!("  datapoint-{id}: not started (batch aborted)");
    }
}
