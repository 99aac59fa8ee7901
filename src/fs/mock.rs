// src/fs/mock.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::FileSystem;

/// In-memory set of "existing" file paths.
///
/// Clones share state, so a test can keep one handle while the supervisor
/// holds another and flip a path's existence mid-test (e.g. to exercise the
/// restart-after-the-script-vanished path).
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path as an existing file.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf());
    }

    /// Make a path vanish.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files.lock().unwrap().remove(path.as_ref());
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.exists(path)
    }
}
