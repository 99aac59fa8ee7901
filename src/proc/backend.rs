// src/proc/backend.rs

//! Pluggable process backend abstraction.
//!
//! The runtime talks to a [`ProcessBackend`] instead of `tokio::process`
//! directly. This keeps the supervisor loop testable: the production
//! [`RealProcessBackend`] spawns OS processes, while tests provide a fake
//! that records spawns and emits scripted `Output`/`Exited` events.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::entry::EntryId;
use crate::proc::child::{spawn_output_readers, supervise_child};
use crate::supervisor::EventSender;

/// How the supervisor loop starts and signals child processes.
///
/// `spawn` returns the new child's pid or the reason it could not start;
/// everything after the spawn (output batches, the exit) arrives through
/// the given [`EventSender`], stamped with the run generation.
pub trait ProcessBackend: Send {
    /// Start a child for this run of the entry.
    fn spawn(
        &mut self,
        id: EntryId,
        generation: u64,
        path: PathBuf,
        events: EventSender,
    ) -> Result<u32>;

    /// Ask the entry's live child to terminate. Advisory; completion is
    /// observed through the eventual `Exited` event, not here.
    fn terminate(&mut self, id: EntryId);

    /// Ask every live child to terminate (shutdown).
    fn terminate_all(&mut self);
}

/// Handle for one live child instance.
///
/// `terminate` requests a stop; dropping it instead makes the watcher task
/// return without reporting an exit, and `kill_on_drop` reaps the child.
/// That drop path is how a replaced slot disposes of an abandoned run.
struct ActiveChild {
    terminate: Option<oneshot::Sender<()>>,
    watcher: tokio::task::JoinHandle<()>,
}

/// Production backend running scripts as real OS processes.
///
/// Holds at most one [`ActiveChild`] per entry. The supervisor core never
/// spawns while an entry is Running, but a `reset` abandons a run without
/// touching its process; if the entry is run again afterwards, inserting
/// the new slot drops the abandoned one and its child with it.
#[derive(Default)]
pub struct RealProcessBackend {
    active: HashMap<EntryId, ActiveChild>,
}

impl RealProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessBackend for RealProcessBackend {
    fn spawn(
        &mut self,
        id: EntryId,
        generation: u64,
        path: PathBuf,
        events: EventSender,
    ) -> Result<u32> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&path);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&path);
            c
        };

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for {path:?}"))?;
        let pid = child
            .id()
            .with_context(|| format!("no pid for freshly spawned {path:?}"))?;

        spawn_output_readers(&mut child, id, generation, &events);

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let watcher = tokio::spawn(supervise_child(child, id, generation, events, terminate_rx));

        if let Some(previous) = self.active.insert(
            id,
            ActiveChild {
                terminate: Some(terminate_tx),
                watcher,
            },
        ) {
            if !previous.watcher.is_finished() {
                warn!(id = %id, "replacing live child slot; abandoned instance will be killed");
            }
        }

        debug!(id = %id, pid, generation, "child spawned");
        Ok(pid)
    }

    fn terminate(&mut self, id: EntryId) {
        let Some(active) = self.active.get_mut(&id) else {
            debug!(id = %id, "terminate requested but no child slot");
            return;
        };
        match active.terminate.take() {
            Some(tx) => {
                if tx.send(()).is_err() {
                    debug!(id = %id, "child already exited before terminate request");
                }
            }
            None => debug!(id = %id, "terminate already requested for this child"),
        }
    }

    fn terminate_all(&mut self) {
        for (id, active) in self.active.iter_mut() {
            if let Some(tx) = active.terminate.take() {
                if tx.send(()).is_err() {
                    debug!(id = %id, "child already exited before shutdown terminate");
                }
            }
        }
    }
}
