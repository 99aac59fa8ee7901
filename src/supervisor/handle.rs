// src/supervisor/handle.rs

//! Cloneable client handle for a running supervisor.
//!
//! All methods are thin wrappers that post a message into the supervisor
//! inbox; the loop applies them in arrival order, so effects of two calls
//! from one task are observed in call order. Every method fails with
//! [`ScriptError::SupervisorClosed`] once the loop has exited.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::buffer::OutputLimit;
use crate::entry::{EntryId, EntrySnapshot};
use crate::errors::{Result, ScriptError};
use crate::supervisor::{Message, SupervisorEvent};

/// Handle used by callers to operate the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Message>,
}

impl SupervisorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    async fn send_event(&self, event: SupervisorEvent) -> Result<()> {
        self.tx
            .send(Message::Event(event))
            .await
            .map_err(|_| ScriptError::SupervisorClosed)
    }

    /// Register a new script entry and return its id.
    ///
    /// An entry whose path is not accessible is still registered, in Error
    /// state with a diagnostic line; the path is re-checked on every run.
    pub async fn add_script(&self, path: impl Into<PathBuf>) -> Result<EntryId> {
        let id = EntryId::new();
        self.send_event(SupervisorEvent::AddScript {
            id,
            path: path.into(),
        })
        .await?;
        Ok(id)
    }

    /// Start a script. No-op while it is already running or its path is
    /// not accessible.
    pub async fn run(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::RunRequested { id }).await
    }

    /// Stop a script and wait until the stop has settled.
    ///
    /// Resolves after the child's exit has been processed plus the settle
    /// delay, or immediately when nothing is running.
    pub async fn stop(&self, id: EntryId) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Stop { id, done: done_tx })
            .await
            .map_err(|_| ScriptError::SupervisorClosed)?;
        done_rx.await.map_err(|_| ScriptError::SupervisorClosed)
    }

    /// Stop a script, then start it again after the restart delay.
    pub async fn restart(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::RestartRequested { id })
            .await
    }

    /// Force an entry back to Idle, clearing its output and dropping any
    /// stored process handle without touching the OS process.
    pub async fn reset(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::ResetRequested { id }).await
    }

    /// Delete an entry, terminating its child first if one is running.
    pub async fn remove_script(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::RemoveScript { id }).await
    }

    /// Flip an entry's autostart flag.
    pub async fn toggle_auto_start(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::ToggleAutoStart { id })
            .await
    }

    /// Clear an entry's captured output.
    pub async fn clear_output(&self, id: EntryId) -> Result<()> {
        self.send_event(SupervisorEvent::ClearOutput { id }).await
    }

    /// Change the shared output-buffer limit.
    pub async fn set_output_limit(&self, limit: OutputLimit) -> Result<()> {
        self.send_event(SupervisorEvent::SetOutputLimit { limit })
            .await
    }

    /// Snapshot every entry, in display order.
    pub async fn entries(&self) -> Result<Vec<EntrySnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| ScriptError::SupervisorClosed)?;
        reply_rx.await.map_err(|_| ScriptError::SupervisorClosed)
    }

    /// Snapshot one entry, or `None` if the id is not registered.
    pub async fn entry(&self, id: EntryId) -> Result<Option<EntrySnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::SnapshotOne { id, reply: reply_tx })
            .await
            .map_err(|_| ScriptError::SupervisorClosed)?;
        reply_rx.await.map_err(|_| ScriptError::SupervisorClosed)
    }

    /// Terminate every running script and stop the supervisor loop.
    /// Resolves once the loop has fully exited.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown { done: done_tx })
            .await
            .map_err(|_| ScriptError::SupervisorClosed)?;
        done_rx.await.map_err(|_| ScriptError::SupervisorClosed)
    }
}
