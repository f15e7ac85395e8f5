// tests/process_runner.rs
//
// Drives real child processes through a small shell stand-in for the
// simulation binary. Each datapoint's behaviour.sh decides what it prints
// and how it exits.
#![cfg(unix)]

mod common;
use crate::common::{exists, init_tracing, SimTree};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use simbatch::config::BatchConfig;
use simbatch::exec::{BatchExecutor, CancelSignal, ProcessRunner};
use simbatch::fs::RealFileSystem;
use simbatch::plan::{FixedResumePolicy, Plan, TaskPlanner};
use simbatch::progress::ProgressTracker;
use simbatch::run_batch;
use simbatch::task::{FailureCause, RunOutcome, STDERR_LOG, STDOUT_LOG};
use simbatch::types::SchedulingPolicy;
use simbatch_test_utils::builders::{simulation_config, BatchConfigBuilder};
use simbatch_test_utils::fake_runner::pending_task;
use simbatch_test_utils::fake_simulation::{mark_completed, script_datapoint};
use simbatch_test_utils::with_timeout;

type TestResult = Result<(), Box<dyn Error>>;

fn plan_for(cfg: &BatchConfig) -> Result<Plan, Box<dyn Error>> {
    Ok(TaskPlanner::new(&RealFileSystem, &cfg.artifacts).plan(
        cfg.number_datapoints,
        &cfg.output_directory,
        &FixedResumePolicy::skip(),
    )?)
}

#[tokio::test]
async fn mixed_batch_records_every_outcome() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "echo \"Time=13.75\"\nexit 0\n")?;
    script_datapoint(&tree.output, 1, "echo \"Time=13.75\"\nexit 1\n")?;
    script_datapoint(&tree.output, 2, "echo \"Time=27.5\"\nexit 0\n")?;

    let cfg = BatchConfigBuilder::new(&tree.output, 3)
        .binary(&tree.binary)
        .policy(SchedulingPolicy::Concurrent)
        .max_parallel(2)
        .build();
    let plan = plan_for(&cfg)?;

    let runner = ProcessRunner::new(Arc::new(cfg.simulation.clone()));
    let executor = BatchExecutor::new(runner, ProgressTracker::new(plan.runnable_count()));
    let result = with_timeout(executor.execute(plan, cfg.max_parallel, cfg.policy)).await;

    assert_eq!(result.get(0), Some(&RunOutcome::Succeeded));
    assert_eq!(result.get(2), Some(&RunOutcome::Succeeded));
    match result.get(1) {
        Some(RunOutcome::Failed(report)) => {
            assert_eq!(report.exit_code, Some(1));
            assert_eq!(report.cause, FailureCause::NonZeroExit);
            assert_eq!(report.stderr_log, tree.datapoint(1).join(STDERR_LOG));
            assert!(report.command_line.ends_with("fake-simulation"));
        }
        other => panic!("Expected datapoint 1 to fail, got: {:?}", other),
    }

    let tracker = executor.tracker();
    assert_eq!(tracker.fraction_of(0), Some(1.0));
    assert_eq!(tracker.fraction_of(1), Some(0.5));
    assert_eq!(tracker.fraction_of(2), Some(1.0));

    for id in 0..3 {
        assert!(exists(tree.datapoint(id).join(STDOUT_LOG)));
        assert!(exists(tree.datapoint(id).join(STDERR_LOG)));
    }

    Ok(())
}

#[tokio::test]
async fn logs_capture_stdout_verbatim_and_stderr() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(
        &tree.output,
        0,
        "echo \"Step 1\"\necho \"Time=  5.5 s\"\necho \"diverged\" >&2\nexit 3\n",
    )?;

    let runner = ProcessRunner::new(Arc::new(simulation_config(&tree.binary, None)));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let outcome = with_timeout(runner.run(&task, &tracker, CancelSignal::never())).await;

    assert_eq!(outcome.exit_code(), Some(3));
    assert_eq!(tree.read_log(0, STDOUT_LOG), "Step 1\nTime=  5.5 s\n");
    assert_eq!(tree.read_log(0, STDERR_LOG), "diverged\n");
    assert_eq!(tracker.fraction_of(0), Some(5.5 / 27.5));

    Ok(())
}

#[tokio::test]
async fn missing_binary_is_a_launch_failure_with_logs() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    let missing = tree.tmp.path().join("bin").join("no-such-simulation");

    let runner = ProcessRunner::new(Arc::new(simulation_config(&missing, None)));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let outcome = with_timeout(runner.run(&task, &tracker, CancelSignal::never())).await;

    match outcome {
        RunOutcome::Failed(report) => {
            assert!(matches!(report.cause, FailureCause::Launch(_)));
            assert_eq!(report.exit_code, None);
            assert!(exists(&report.stdout_log));
            assert!(exists(&report.stderr_log));
        }
        other => panic!("Expected launch failure, got: {:?}", other),
    }
    assert_eq!(tracker.fraction_of(0), None);

    Ok(())
}

#[tokio::test]
async fn cancellation_kills_a_running_simulation() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "echo \"Time=1.0\"\nexec sleep 30\n")?;
    script_datapoint(&tree.output, 1, "exit 0\n")?;

    let cfg = BatchConfigBuilder::new(&tree.output, 2)
        .binary(&tree.binary)
        .max_parallel(2)
        .build();
    let plan = plan_for(&cfg)?;

    let runner = ProcessRunner::new(Arc::new(cfg.simulation.clone()));
    let executor = BatchExecutor::new(runner, ProgressTracker::new(2));
    let handle = executor.cancel_handle();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel(0)
    };
    let (result, _) = with_timeout(async {
        tokio::join!(
            executor.execute(plan, cfg.max_parallel, cfg.policy),
            canceller
        )
    })
    .await;

    assert_eq!(result.get(0), Some(&RunOutcome::Cancelled));
    assert_eq!(result.get(1), Some(&RunOutcome::Succeeded));
    assert_eq!(tree.read_log(0, STDOUT_LOG), "Time=1.0\n");

    Ok(())
}

#[tokio::test]
async fn silent_simulation_hits_the_idle_timeout() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "exec sleep 30\n")?;

    let runner = ProcessRunner::new(Arc::new(simulation_config(
        &tree.binary,
        Some(Duration::from_millis(200)),
    )));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let outcome = with_timeout(runner.run(&task, &tracker, CancelSignal::never())).await;

    match outcome {
        RunOutcome::Failed(report) => {
            assert_eq!(report.cause, FailureCause::TimedOut(Duration::from_millis(200)));
            assert_eq!(report.exit_code, None);
        }
        other => panic!("Expected timeout, got: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn sequential_batch_with_real_processes_stops_early() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "echo \"Time=27.5\"\n")?;
    script_datapoint(&tree.output, 1, "echo boom >&2\nexit 2\n")?;
    script_datapoint(&tree.output, 2, "touch ran-anyway\n")?;

    let cfg = BatchConfigBuilder::new(&tree.output, 3)
        .binary(&tree.binary)
        .policy(SchedulingPolicy::Sequential)
        .build();
    let plan = plan_for(&cfg)?;
    let runner = ProcessRunner::new(Arc::new(cfg.simulation.clone()));

    let result = with_timeout(run_batch(&cfg, plan, runner, false)).await;

    assert_eq!(result.get(0), Some(&RunOutcome::Succeeded));
    assert_eq!(result.get(1).and_then(RunOutcome::exit_code), Some(2));
    assert_eq!(result.not_started, vec![2]);
    assert!(!tree.datapoint(2).join("ran-anyway").exists());
    assert!(!exists(tree.datapoint(2).join(STDOUT_LOG)));

    match simbatch::first_error(&result) {
        Some(simbatch::errors::SimbatchError::ProcessFailure { task, exit_code, .. }) => {
            assert_eq!(task, 1);
            assert_eq!(exit_code, Some(2));
        }
        other => panic!("Expected ProcessFailure, got: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn completed_datapoints_are_not_rerun() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    mark_completed(&tree.output, 0)?;
    script_datapoint(&tree.output, 0, "touch ran-again\n")?;
    script_datapoint(&tree.output, 1, "exit 0\n")?;

    let cfg = BatchConfigBuilder::new(&tree.output, 2)
        .binary(&tree.binary)
        .build();
    let plan = plan_for(&cfg)?;
    let runner = ProcessRunner::new(Arc::new(cfg.simulation.clone()));

    let result = with_timeout(run_batch(&cfg, plan, runner, false)).await;

    assert_eq!(result.get(0), Some(&RunOutcome::SkippedExisting));
    assert_eq!(result.get(1), Some(&RunOutcome::Succeeded));
    assert!(!tree.datapoint(0).join("ran-again").exists());
    assert!(result.ensure_success().is_ok());

    Ok(())
}

#[tokio::test]
async fn process_lingering_after_closing_stdout_hits_the_idle_timeout() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "echo \"Time=1.0\"\nexec >&-\nexec sleep 30\n")?;

    let runner = ProcessRunner::new(Arc::new(simulation_config(
        &tree.binary,
        Some(Duration::from_millis(200)),
    )));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        runner.run(&task, &tracker, CancelSignal::never()),
    )
    .await
    .expect("runner must not wait on a silent process forever");

    match outcome {
        RunOutcome::Failed(report) => {
            assert_eq!(report.cause, FailureCause::TimedOut(Duration::from_millis(200)));
            assert_eq!(report.exit_code, None);
        }
        other => panic!("Expected timeout, got: {:?}", other),
    }
    assert_eq!(tree.read_log(0, STDOUT_LOG), "Time=1.0\n");

    Ok(())
}

#[tokio::test]
async fn slow_but_healthy_simulation_survives_a_short_idle_timeout() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    script_datapoint(&tree.output, 0, "sleep 0.2\necho \"Time=27.5\"\nexit 0\n")?;

    let runner = ProcessRunner::new(Arc::new(simulation_config(
        &tree.binary,
        Some(Duration::from_secs(5)),
    )));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let outcome = with_timeout(runner.run(&task, &tracker, CancelSignal::never())).await;

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(tracker.fraction_of(0), Some(1.0));
    Ok(())
}

/// True once `pid` is gone or only a zombie awaiting its reaper.
#[cfg(target_os = "linux")]
fn process_is_dead(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn cancellation_kills_helper_processes_of_the_simulation() -> TestResult {
    init_tracing();

    let tree = SimTree::new()?;
    // The helper stands in for an MPI rank started by the launcher.
    script_datapoint(
        &tree.output,
        0,
        "sleep 30 &\necho $! > helper.pid\necho \"Time=1.0\"\nwait\n",
    )?;

    let runner = ProcessRunner::new(Arc::new(simulation_config(&tree.binary, None)));
    let tracker = ProgressTracker::new(1);
    let task = pending_task(&tree.output.display().to_string(), 0);

    let handle = simbatch::exec::CancelHandle::new();
    let signal = handle.register(0);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel(0)
    };
    let (outcome, _) =
        with_timeout(async { tokio::join!(runner.run(&task, &tracker, signal), canceller) }).await;
    assert_eq!(outcome, RunOutcome::Cancelled);

    let helper: u32 = std::fs::read_to_string(tree.datapoint(0).join("helper.pid"))?
        .trim()
        .parse()?;

    let mut dead = false;
    for _ in 0..40 {
        if process_is_dead(helper) {
            dead = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(dead, "helper process {helper} survived cancellation");

    Ok(())
}
