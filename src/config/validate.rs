// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{BatchConfig, CompletionArtifacts, RawConfigFile, SimulationConfig};
use crate::errors::{Result, SimbatchError};

impl TryFrom<RawConfigFile> for BatchConfig {
    type Error = SimbatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let number_datapoints = raw.general.number_datapoints.ok_or_else(|| {
            SimbatchError::ConfigError(
                "[general].number_datapoints is required (or pass --datapoints)".to_string(),
            )
        })?;
        let output_directory = raw.general.output_directory.clone().ok_or_else(|| {
            SimbatchError::ConfigError(
                "[general].output_directory is required (or pass --output-dir)".to_string(),
            )
        })?;

        validate_simulation(&raw)?;
        validate_artifacts(&raw)?;

        let idle_timeout = raw
            .simulation
            .idle_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| SimbatchError::ConfigError(format!("[simulation].idle_timeout: {e}")))?;
        if idle_timeout == Some(Duration::ZERO) {
            return Err(SimbatchError::ConfigError(
                "[simulation].idle_timeout must be greater than zero (omit it to disable)"
                    .to_string(),
            ));
        }

        let sim = raw.simulation;
        Ok(BatchConfig {
            number_datapoints,
            output_directory,
            simulation: SimulationConfig {
                binary: sim.binary,
                mpirun: sim.mpirun,
                mpirun_procs: sim.mpirun_procs,
                gpu: sim.mpirun_gpu,
                mute_output: sim.mute_simulation_output,
                idle_timeout,
            },
            policy: raw.batch.policy,
            max_parallel: raw.batch.max_parallel,
            resume: raw.batch.resume,
            artifacts: CompletionArtifacts {
                primary: raw.artifacts.primary,
                auxiliary: raw.artifacts.auxiliary,
            },
        })
    }
}

fn validate_simulation(cfg: &RawConfigFile) -> Result<()> {
    let sim = &cfg.simulation;

    if sim.binary.trim().is_empty() {
        return Err(SimbatchError::ConfigError(
            "[simulation].binary must not be empty".to_string(),
        ));
    }

    if sim.mpirun_procs == Some(0) {
        return Err(SimbatchError::ConfigError(
            "[simulation].mpirun_procs must be >= 1 (got 0)".to_string(),
        ));
    }

    if sim.mpirun_gpu && !sim.mpirun {
        return Err(SimbatchError::ConfigError(
            "[simulation].mpirun_gpu requires mpirun = true".to_string(),
        ));
    }

    Ok(())
}

fn validate_artifacts(cfg: &RawConfigFile) -> Result<()> {
    let artifacts = &cfg.artifacts;
    if artifacts.primary.trim().is_empty() || artifacts.auxiliary.trim().is_empty() {
        return Err(SimbatchError::ConfigError(
            "[artifacts] file names must not be empty".to_string(),
        ));
    }
    if artifacts.primary == artifacts.auxiliary {
        return Err(SimbatchError::ConfigError(format!(
            "[artifacts].primary and [artifacts].auxiliary must differ (both '{}')",
            artifacts.primary
        )));
    }
    Ok(())
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_required() -> RawConfigFile {
        let mut raw = RawConfigFile::default();
        raw.general.number_datapoints = Some(2);
        raw.general.output_directory = Some("out".into());
        raw
    }

    #[test]
    fn parses_supported_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration(" 1h "), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn oversized_durations_are_errors_not_overflows() {
        assert_eq!(
            parse_duration("6000000000000000h"),
            Err("duration too large: '6000000000000000h'".to_string())
        );
        assert!(parse_duration("18446744073709551615m").is_err());
        assert!(parse_duration("18446744073709551615s").is_ok());
        assert!(parse_duration("18446744073709551616s").is_err());
    }

    #[test]
    fn defaults_fill_everything_but_the_required_fields() {
        let cfg = BatchConfig::try_from(raw_with_required()).unwrap();
        assert_eq!(cfg.simulation, SimulationConfig::default());
        assert_eq!(cfg.artifacts, CompletionArtifacts::default());
        assert_eq!(cfg.max_parallel, 1);
    }

    #[test]
    fn missing_datapoint_count_is_a_config_error() {
        let mut raw = raw_with_required();
        raw.general.number_datapoints = None;
        match BatchConfig::try_from(raw) {
            Err(SimbatchError::ConfigError(msg)) => assert!(msg.contains("number_datapoints")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn gpu_without_mpirun_is_rejected() {
        let mut raw = raw_with_required();
        raw.simulation.mpirun_gpu = true;
        assert!(matches!(
            BatchConfig::try_from(raw),
            Err(SimbatchError::ConfigError(_))
        ));
    }

    #[test]
    fn zero_mpi_procs_is_rejected() {
        let mut raw = raw_with_required();
        raw.simulation.mpirun = true;
        raw.simulation.mpirun_procs = Some(0);
        assert!(matches!(
            BatchConfig::try_from(raw),
            Err(SimbatchError::ConfigError(_))
        ));
    }

    #[test]
    fn idle_timeout_is_parsed() {
        let mut raw = raw_with_required();
        raw.simulation.idle_timeout = Some("90s".into());
        let cfg = BatchConfig::try_from(raw).unwrap();
        assert_eq!(cfg.simulation.idle_timeout, Some(Duration::from_secs(90)));

        let mut raw = raw_with_required();
        raw.simulation.idle_timeout = Some("soon".into());
        assert!(BatchConfig::try_from(raw).is_err());
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        for zero in ["0s", "0ms", "0m"] {
            let mut raw = raw_with_required();
            raw.simulation.idle_timeout = Some(zero.into());
            match BatchConfig::try_from(raw) {
                Err(SimbatchError::ConfigError(msg)) => {
                    assert!(msg.contains("greater than zero"), "{zero}: {msg}")
                }
                other => panic!("expected ConfigError for {zero}, got {other:?}"),
            }
        }
    }
}
