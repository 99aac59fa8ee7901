// src/fs/mod.rs

//! Filesystem seam for script-path accessibility checks.
//!
//! The supervisor re-checks a script's path on every run rather than caching
//! validity. Routing the check through this trait lets tests make paths
//! appear and vanish without touching the disk.

use std::fmt::Debug;
use std::path::Path;

pub mod mock;

/// Abstract path-probing interface.
pub trait FileSystem: Send + Sync + Debug {
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
}

/// Implementation that asks `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}
