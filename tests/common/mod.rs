#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub use simbatch_test_utils::init_tracing;
use simbatch_test_utils::fake_simulation::write_fake_binary;

/// A temp output root plus a fake simulation binary living next to it.
pub struct SimTree {
    pub tmp: TempDir,
    pub output: PathBuf,
    pub binary: PathBuf,
}

impl SimTree {
    pub fn new() -> std::io::Result<Self> {
        let tmp = TempDir::new()?;
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&output)?;
        let bin_dir = tmp.path().join("bin");
        std::fs::create_dir_all(&bin_dir)?;
        let binary = write_fake_binary(&bin_dir)?;
        Ok(Self { tmp, output, binary })
    }

    pub fn datapoint(&self, id: u32) -> PathBuf {
        self.output.join(format!("datapoint-{id}"))
    }

    pub fn read_log(&self, id: u32, name: &str) -> String {
        std::fs::read_to_string(self.datapoint(id).join(name)).unwrap_or_default()
    }
}

pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}
