// src/plan/mod.rs

//! Deciding which datapoints a batch has to simulate.
//!
//! - [`resume`] holds the skip/rerun decision for datapoints that already
//!   carry completion artifacts.
//! - [`planner`] enumerates the datapoint directories and applies that
//!   decision, producing an ordered [`Plan`].

pub mod planner;
pub mod resume;

pub use planner::{Plan, TaskPlanner};
pub use resume::{
    policy_for_mode, FixedResumePolicy, InteractiveResumePolicy, ResumeDecision, ResumePolicy,
};
