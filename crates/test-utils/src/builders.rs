#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use simbatch::config::{BatchConfig, RawConfigFile, SimulationConfig};
use simbatch::types::{ResumeMode, SchedulingPolicy};

/// Builder for `BatchConfig` to simplify test setup.
pub struct BatchConfigBuilder {
    config: RawConfigFile,
}

impl BatchConfigBuilder {
    pub fn new(output_directory: impl AsRef<Path>, datapoints: u32) -> Self {
        let mut config = RawConfigFile::default();
        config.general.output_directory = Some(output_directory.as_ref().to_path_buf());
        config.general.number_datapoints = Some(datapoints);
        config.batch.resume = ResumeMode::Skip;
        Self { config }
    }

    pub fn binary(mut self, binary: impl AsRef<Path>) -> Self {
        self.config.simulation.binary = binary.as_ref().display().to_string();
        self
    }

    pub fn policy(mut self, policy: SchedulingPolicy) -> Self {
        self.config.batch.policy = policy;
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.config.batch.max_parallel = n;
        self
    }

    pub fn resume(mut self, mode: ResumeMode) -> Self {
        self.config.batch.resume = mode;
        self
    }

    pub fn idle_timeout(mut self, timeout: &str) -> Self {
        self.config.simulation.idle_timeout = Some(timeout.to_string());
        self
    }

    pub fn mute_output(mut self, val: bool) -> Self {
        self.config.simulation.mute_simulation_output = val;
        self
    }

    pub fn build(self) -> BatchConfig {
        BatchConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// `SimulationConfig` running `binary` directly, optionally with a timeout.
pub fn simulation_config(binary: impl AsRef<Path>, idle_timeout: Option<Duration>) -> SimulationConfig {
    SimulationConfig {
        binary: binary.as_ref().display().to_string(),
        idle_timeout,
        ..SimulationConfig::default()
    }
}
