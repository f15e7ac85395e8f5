// src/plan/resume.rs

use std::path::Path;

use dialoguer::Confirm;

use crate::errors::{Result, SimbatchError};
use crate::types::ResumeMode;

/// Whether an already simulated datapoint runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Skip,
    Rerun,
}

/// Decides what happens to a datapoint directory that already holds both
/// completion artifacts.
///
/// Any `Fn(&Path) -> Result<ResumeDecision>` closure is a policy, which
/// keeps the planner testable without a terminal.
pub trait ResumePolicy: Send + Sync {
    fn decide(&self, dir: &Path) -> Result<ResumeDecision>;
}

impl<F> ResumePolicy for F
where
    F: Fn(&Path) -> Result<ResumeDecision> + Send + Sync,
{
    fn decide(&self, dir: &Path) -> Result<ResumeDecision> {
        self(dir)
    }
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedResumePolicy(ResumeDecision);

impl FixedResumePolicy {
    pub fn skip() -> Self {
        Self(ResumeDecision::Skip)
    }

    pub fn rerun() -> Self {
        Self(ResumeDecision::Rerun)
    }
}

impl ResumePolicy for FixedResumePolicy {
    fn decide(&self, _dir: &Path) -> Result<ResumeDecision> {
        Ok(self.0)
    }
}

/// Asks the operator on the terminal, defaulting to "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractiveResumePolicy;

impl ResumePolicy for InteractiveResumePolicy {
    fn decide(&self, dir: &Path) -> Result<ResumeDecision> {
        let rerun = Confirm::new()
            .with_prompt(format!(
                "Looks like the simulation already ran in {}, run simulation again?",
                dir.display()
            ))
            .default(false)
            .interact()
            .map_err(|e| SimbatchError::Planning {
                dir: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(if rerun {
            ResumeDecision::Rerun
        } else {
            ResumeDecision::Skip
        })
    }
}

/// Policy matching the `resume` setting.
pub fn policy_for_mode(mode: ResumeMode) -> Box<dyn ResumePolicy> {
    match mode {
        ResumeMode::Ask => Box::new(InteractiveResumePolicy),
        ResumeMode::Skip => Box::new(FixedResumePolicy::skip()),
        ResumeMode::Rerun => Box::new(FixedResumePolicy::rerun()),
    }
}
