// src/config/mod.rs

//! Configuration loading and validation for simbatch.
//!
//! - `model.rs`: the TOML-backed data model and the checked runtime types.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: `RawConfigFile` -> `BatchConfig` conversion.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ArtifactsSection, BatchConfig, BatchSection, CompletionArtifacts, GeneralSection,
    RawConfigFile, SimulationConfig, SimulationSection,
};
pub use validate::parse_duration;
