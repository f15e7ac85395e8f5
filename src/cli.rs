// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;
use crate::types::{ResumeMode, SchedulingPolicy};

/// Command-line arguments for `simbatch`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "simbatch",
    version,
    about = "Run a batch of simulation datapoints with live progress and per-datapoint failure reports.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Simbatch.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the `datapoint-{index}` directories.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of datapoints in the batch.
    #[arg(long, value_name = "N")]
    pub datapoints: Option<u32>,

    /// Maximum number of simulations running at once (0 = unbounded).
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Scheduling policy.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub policy: Option<SchedulingPolicy>,

    /// What to do with datapoints that already have simulation results.
    #[arg(long, value_enum, value_name = "MODE")]
    pub resume: Option<ResumeMode>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIMBATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Do not draw the progress bar; log progress instead.
    #[arg(long)]
    pub no_progress: bool,

    /// Plan the batch and print it, but do not launch any simulation.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Command-line flags win over the config file.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(ref dir) = self.output_dir {
            raw.general.output_directory = Some(dir.clone());
        }
        if let Some(n) = self.datapoints {
            raw.general.number_datapoints = Some(n);
        }
        if let Some(n) = self.max_parallel {
            raw.batch.max_parallel = n;
        }
        if let Some(policy) = self.policy {
            raw.batch.policy = policy;
        }
        if let Some(resume) = self.resume {
            raw.batch.resume = resume;
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
