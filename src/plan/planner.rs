// src/plan/planner.rs

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::CompletionArtifacts;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::plan::resume::{ResumeDecision, ResumePolicy};
use crate::task::{datapoint_dir, DatapointTask, TaskId, TaskStatus};

/// Ordered result of planning: every datapoint in index order, either
/// `Pending` (to run) or `SkippedExisting`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    tasks: Vec<DatapointTask>,
}

impl Plan {
    pub fn tasks(&self) -> &[DatapointTask] {
        &self.tasks
    }

    pub fn runnable(&self) -> impl Iterator<Item = &DatapointTask> {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Pending)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DatapointTask> {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::SkippedExisting)
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable().count()
    }

    pub fn into_tasks(self) -> Vec<DatapointTask> {
        self.tasks
    }
}

impl From<Vec<DatapointTask>> for Plan {
    fn from(tasks: Vec<DatapointTask>) -> Self {
        Self { tasks }
    }
}

/// Enumerates `datapoint-{index}` directories and decides which of them
/// still need a simulation run.
#[derive(Debug)]
pub struct TaskPlanner<'a> {
    fs: &'a dyn FileSystem,
    artifacts: &'a CompletionArtifacts,
}

impl<'a> TaskPlanner<'a> {
    pub fn new(fs: &'a dyn FileSystem, artifacts: &'a CompletionArtifacts) -> Self {
        Self { fs, artifacts }
    }

    /// Plan `task_count` datapoints under `output_root`.
    ///
    /// A datapoint whose directory holds both completion artifacts is
    /// handed to `policy`; everything else is planned to run.
    pub fn plan(
        &self,
        task_count: u32,
        output_root: &Path,
        policy: &dyn ResumePolicy,
    ) -> Result<Plan> {
        let mut tasks = Vec::with_capacity(task_count as usize);

        for id in 0..task_count {
            let mut task = DatapointTask::new(id, datapoint_dir(output_root, id));

            if self.already_completed(&task.dir) {
                warn!(
                    task = id,
                    dir = %task.dir.display(),
                    "{} and {} files present",
                    self.artifacts.primary,
                    self.artifacts.auxiliary
                );
                match policy.decide(&task.dir)? {
                    ResumeDecision::Skip => {
                        task.transition(TaskStatus::SkippedExisting)?;
                        info!(task = id, "skipping already simulated datapoint");
                    }
                    ResumeDecision::Rerun => {
                        info!(task = id, "rerunning already simulated datapoint");
                    }
                }
            } else {
                debug!(task = id, dir = %task.dir.display(), "no completion artifacts; planned");
            }

            tasks.push(task);
        }

        let plan = Plan { tasks };
        info!(
            total = task_count,
            runnable = plan.runnable_count(),
            skipped = plan.skipped().count(),
            "planning finished"
        );
        Ok(plan)
    }

    fn already_completed(&self, dir: &Path) -> bool {
        self.fs.is_file(&dir.join(&self.artifacts.primary))
            && self.fs.is_file(&dir.join(&self.artifacts.auxiliary))
    }
}

/// Ids of the runnable datapoints, in order.
pub fn runnable_ids(plan: &Plan) -> Vec<TaskId> {
    plan.runnable().map(|t| t.id).collect()
}
