// src/progress/mod.rs

//! Batch-wide progress derived from the simulations' stdout.
//!
//! - [`marker`] extracts simulated time from `Time=<value>` lines and turns
//!   it into a clamped fraction.
//! - [`tracker`] keeps the latest fraction per datapoint behind a mutex and
//!   computes the aggregate percentage.
//! - [`sink`] is the injected `report(percent)` capability.
//! - [`display`] is the single consumer rendering the aggregate as a
//!   terminal progress bar.

pub mod display;
pub mod marker;
pub mod sink;
pub mod tracker;

pub use display::spawn_progress_display;
pub use marker::{fraction_complete, parse_progress, ProgressSample, TOTAL_SIMULATED_DURATION};
pub use sink::{LogSink, NoopSink, ProgressSink};
pub use tracker::{ProgressSnapshot, ProgressTracker};
