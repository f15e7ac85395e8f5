// src/fs/mock.rs

use super::FileSystem;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory set of regular files for planning tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>) {
        self.lock().insert(path.as_ref().to_path_buf());
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.lock().remove(path.as_ref());
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }
}
