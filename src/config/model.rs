// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{ResumeMode, SchedulingPolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [general]
/// number_datapoints = 3
/// output_directory = "output"
///
/// [simulation]
/// mpirun = true
/// mpirun_procs = 4
///
/// [batch]
/// policy = "concurrent"
/// max_parallel = 2
/// ```
///
/// All sections are optional; `number_datapoints` and `output_directory`
/// may instead be supplied on the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub general: GeneralSection,

    #[serde(default)]
    pub simulation: SimulationSection,

    #[serde(default)]
    pub batch: BatchSection,

    #[serde(default)]
    pub artifacts: ArtifactsSection,
}

/// `[general]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralSection {
    /// Number of `datapoint-{index}` directories to drive.
    #[serde(default)]
    pub number_datapoints: Option<u32>,

    /// Root holding the datapoint directories.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
}

/// `[simulation]` section: how each process is launched.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Prefix the command with `mpirun`.
    #[serde(default)]
    pub mpirun: bool,

    /// `-n <procs>` for `mpirun`; omitted when unset.
    #[serde(default)]
    pub mpirun_procs: Option<u32>,

    /// Select the CUDA vector/matrix and solver backends.
    #[serde(default)]
    pub mpirun_gpu: bool,

    /// Pass `-screen_output off` to the simulation.
    #[serde(default)]
    pub mute_simulation_output: bool,

    /// Kill a simulation that prints nothing on stdout for this long
    /// (e.g. `"30m"`). Disabled when unset.
    #[serde(default)]
    pub idle_timeout: Option<String>,
}

fn default_binary() -> String {
    "pflotran".to_string()
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            mpirun: false,
            mpirun_procs: None,
            mpirun_gpu: false,
            mute_simulation_output: false,
            idle_timeout: None,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    #[serde(default)]
    pub policy: SchedulingPolicy,

    /// Upper bound on simultaneously running simulations; `0` is unbounded.
    /// Ignored by the sequential policy.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub resume: ResumeMode,
}

fn default_max_parallel() -> usize {
    1
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::default(),
            max_parallel: default_max_parallel(),
            resume: ResumeMode::default(),
        }
    }
}

/// `[artifacts]` section: files whose joint presence marks a datapoint as
/// already simulated.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsSection {
    #[serde(default = "default_primary")]
    pub primary: String,

    #[serde(default = "default_auxiliary")]
    pub auxiliary: String,
}

fn default_primary() -> String {
    "pflotran.out".to_string()
}

fn default_auxiliary() -> String {
    "pflotran.h5".to_string()
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            auxiliary: default_auxiliary(),
        }
    }
}

/// Immutable launch configuration shared by every simulation process.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub binary: String,
    pub mpirun: bool,
    pub mpirun_procs: Option<u32>,
    pub gpu: bool,
    pub mute_output: bool,
    pub idle_timeout: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            mpirun: false,
            mpirun_procs: None,
            gpu: false,
            mute_output: false,
            idle_timeout: None,
        }
    }
}

/// Names of the two completion artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionArtifacts {
    pub primary: String,
    pub auxiliary: String,
}

impl Default for CompletionArtifacts {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            auxiliary: default_auxiliary(),
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so every field has
/// passed the checks in `validate.rs`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub number_datapoints: u32,
    pub output_directory: PathBuf,
    pub simulation: SimulationConfig,
    pub policy: SchedulingPolicy,
    pub max_parallel: usize,
    pub resume: ResumeMode,
    pub artifacts: CompletionArtifacts,
}
