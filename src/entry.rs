// src/entry.rs

//! Script entries: identity, lifecycle state, and the read-only view the
//! display layer consumes.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Opaque identifier for a registered script entry.
///
/// Assigned once at creation and never reused or mutated; removing an entry
/// retires its id permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStatus {
    /// No live process. Entries start here and return here after a clean
    /// exit, a user stop, or a reset.
    Idle,
    /// A child process is attached and has not exited yet.
    Running,
    /// The last run failed (missing path, spawn failure, or non-zero exit).
    /// Cleared by `reset` or by a later successful `run`.
    Error,
}

/// How a child process ended, as reported by its exit watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0.
    Clean,
    /// Non-zero exit code.
    Code(i32),
    /// Terminated by a signal, including the supervisor's own stop. Benign.
    Signaled,
}

/// Internal per-entry state.
///
/// Owned exclusively by the supervisor core and mutated only on its event
/// loop; everything outside sees [`EntrySnapshot`]s.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub id: EntryId,
    pub path: PathBuf,
    pub status: ScriptStatus,
    pub auto_start: bool,

    /// Pid of the live child. Present iff `status == Running`; this is the
    /// entry's "process handle" in the observable model. Set exactly once
    /// per run (on spawn) and cleared exactly once (exit event, reset, or
    /// removal).
    pub pid: Option<u32>,

    /// Run generation, bumped on every spawn. Exit events and output
    /// batches are stamped with the generation of the run that produced
    /// them; anything older than the current value is stale and ignored.
    pub generation: u64,

    /// True between a stop request and the matching exit event.
    pub stopping: bool,

    /// True while a restart's delayed run phase is outstanding.
    pub restart_pending: bool,
}

impl ScriptEntry {
    pub fn new(id: EntryId, path: PathBuf, auto_start: bool) -> Self {
        Self {
            id,
            path,
            status: ScriptStatus::Idle,
            auto_start,
            pid: None,
            generation: 0,
            stopping: false,
            restart_pending: false,
        }
    }

    /// Display name: the script's filename.
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

/// Filename rendered for display and sorting; falls back to the full path
/// when the path has no final component.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read-only view of one entry for the display layer.
///
/// Snapshots are taken on the supervisor loop, so every snapshot observes a
/// consistent state (never a half-applied transition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub name: String,
    pub path: PathBuf,
    pub status: ScriptStatus,
    pub auto_start: bool,
    pub pid: Option<u32>,
    pub output: Vec<String>,
}
