// src/logging.rs

//! Logging setup for `simbatch` using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` CLI flag (applies to every target)
//! 2. `SIMBATCH_LOG`, as full `EnvFilter` directives
//!    (e.g. `"info,simbatch::exec=debug"`)
//! 3. `info`
//!
//! Logs go to stderr; stdout carries only the progress bar and the final
//! report.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV_VAR: &str = "SIMBATCH_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env_directives: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_directive()));
    }
    match env_directives.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_ENV_VAR} value '{directives}'")),
        None => Ok(EnvFilter::new("info")),
    }
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
