// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum SimbatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The resume policy could not produce a decision (e.g. the interactive
    /// prompt lost its terminal).
    #[error("Planning error for {dir:?}: {reason}")]
    Planning { dir: PathBuf, reason: String },

    #[error("Failed to launch `{command}` for datapoint {task}: {reason}")]
    Launch {
        task: TaskId,
        command: String,
        reason: String,
    },

    #[error(
        "There was an error during executing the command `{command}` (datapoint {task}, exit code {exit_code:?}). Please check the logs at {stderr_log:?}"
    )]
    ProcessFailure {
        task: TaskId,
        exit_code: Option<i32>,
        command: String,
        stderr_log: PathBuf,
    },

    #[error("Datapoint {0} was cancelled")]
    Cancelled(TaskId),

    #[error("Batch finished with {failed} failed and {cancelled} cancelled datapoint(s)")]
    BatchFailed { failed: usize, cancelled: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SimbatchError>;
