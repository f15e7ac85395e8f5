// src/fs/mod.rs

use std::fmt::Debug;
use std::path::Path;

pub mod mock;

/// Filesystem query the planner needs.
///
/// Planning only ever asks whether a completion artifact is present as a
/// regular file; the process runner talks to the real filesystem itself.
pub trait FileSystem: Send + Sync + Debug {
    fn is_file(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}
