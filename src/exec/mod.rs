// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] builds the simulation argument vector.
//! - [`line_reader`] drains a process's stdout into a bounded channel.
//! - [`task_runner`] owns the lifecycle of one simulation process
//!   ([`ProcessRunner`]).
//! - [`backend`] provides the [`TaskRunner`] seam the executor talks to, so
//!   tests can swap in a scripted runner.
//! - [`cancel`] holds the per-datapoint cancellation signals.
//! - [`batch`] schedules datapoints under a [`SchedulingPolicy`] and
//!   assembles the [`BatchResult`](crate::task::BatchResult).
//!
//! [`SchedulingPolicy`]: crate::types::SchedulingPolicy

pub mod backend;
pub mod batch;
pub mod cancel;
pub mod command;
pub mod line_reader;
pub mod task_runner;

pub use backend::{RunContext, TaskRunner};
pub use batch::BatchExecutor;
pub use cancel::{CancelHandle, CancelSignal};
pub use command::{SimulationCommand, GPU_BACKEND_FLAGS};
pub use task_runner::ProcessRunner;
