// src/errors.rs

//! Crate-wide error taxonomy and aliases.
//!
//! Script failures never cross the public boundary as `Err`: they surface as
//! entry state (`status = Error` plus one diagnostic output line, rendered
//! from the `Display` impl here). The `Result` alias is for internal
//! plumbing — store IO, serialization — where propagation is the right move.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    /// The script path did not exist when it was checked (at add or run time).
    #[error("Script not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The OS rejected process creation.
    #[error("Failed to run script: {0}")]
    SpawnFailure(String),

    /// The child exited with a non-zero status.
    #[error("Script exited with status {0}")]
    AbnormalExit(i32),

    /// The child was terminated by a signal. Benign: treated as a normal
    /// stop, never as an entry error.
    #[error("Script terminated by signal")]
    SignalTermination,

    /// The supervisor loop has exited; the handle is now inert.
    #[error("Supervisor is no longer running")]
    SupervisorClosed,

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScriptError>;
