// src/registry.rs

//! Durable registry storage and ordering policy.
//!
//! Entries persist as structured `(path, auto_start)` records in display
//! order, together with the shared output-buffer limit, in a TOML file under
//! the per-user config directory:
//!
//! ```toml
//! output_buffer_limit = 500
//!
//! [[script]]
//! path = "/home/user/bin/sync.sh"
//! auto_start = true
//! ```
//!
//! The in-memory entry map stays authoritative; store failures are surfaced
//! to the caller (the supervisor loop logs and carries on).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_OUTPUT_LIMIT;
use crate::entry::display_name;
use crate::errors::{Result, ScriptError};

/// One persisted script record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub path: PathBuf,

    #[serde(default)]
    pub auto_start: bool,
}

/// The on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFile {
    /// Shared output-buffer limit: `0` disabled, `-1` unlimited, `N` lines.
    #[serde(default = "default_output_limit")]
    pub output_buffer_limit: i64,

    /// Scripts in display order.
    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptRecord>,
}

fn default_output_limit() -> i64 {
    DEFAULT_OUTPUT_LIMIT
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            output_buffer_limit: default_output_limit(),
            scripts: Vec::new(),
        }
    }
}

/// Sort key for display order: case-insensitive filename comparison.
pub fn sort_key(path: &Path) -> String {
    display_name(path).to_lowercase()
}

/// Sort records into display order. The sort is stable, so records with
/// equal filenames keep their persisted relative order.
pub fn sort_records(records: &mut [ScriptRecord]) {
    records.sort_by_key(|r| sort_key(&r.path));
}

/// Durable store backing the registry.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Store at an explicit file path. Tests point this at a temp dir.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location
    /// (`<config_dir>/scriptherd/scripts.toml`).
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| {
            ScriptError::StoreError("no user config directory available".to_string())
        })?;
        Ok(Self {
            path: base.join("scriptherd").join("scripts.toml"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted document, sorted into display order. A missing
    /// file is an empty registry, not an error.
    pub fn load(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            debug!(path = ?self.path, "no store file yet; starting empty");
            return Ok(StoreFile::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading store file {:?}", self.path))?;

        let mut file: StoreFile = toml::from_str(&contents)
            .with_context(|| format!("parsing store file {:?}", self.path))?;

        sort_records(&mut file.scripts);
        Ok(file)
    }

    /// Persist the document, creating parent directories as needed.
    pub fn save(&self, file: &StoreFile) -> Result<()> {
        let contents = toml::to_string_pretty(file)
            .with_context(|| format!("serializing store for {:?}", self.path))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating store dir {:?}", parent))?;
        }

        fs::write(&self.path, contents)
            .with_context(|| format!("writing store file {:?}", self.path))?;

        debug!(path = ?self.path, scripts = file.scripts.len(), "registry persisted");
        Ok(())
    }
}
