// src/supervisor/mod.rs

//! The process supervisor.
//!
//! Everything that mutates entry state flows through one actor loop:
//! [`SupervisorHandle`] operations, child exit watchers, output readers and
//! timers all send messages into a single mpsc inbox. The pure core state
//! machine lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`]; per-event transition logic lives in [`event_handlers`].
//!
//! Timers deserve a note: the core never holds timer handles. It stamps each
//! armed timer with a generation and ignores fires whose generation has gone
//! stale, which gives cancel-then-rearm semantics with plain
//! sleep-then-send tasks.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::buffer::OutputLimit;
use crate::entry::{EntryId, EntrySnapshot, ExitKind, ScriptStatus};
use crate::errors::{Result, ScriptError};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;

pub use core::SupervisorCore;
pub use event_handlers::{Command, Step};
pub use handle::SupervisorHandle;
pub use runtime::SupervisorRuntime;

/// Receiving end of the supervisor's notification stream.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Events flowing into the supervisor core from the handle, child process
/// watchers, output readers, and timers.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// User asked for a script to start.
    RunRequested { id: EntryId },
    /// User asked for a script to stop.
    StopRequested { id: EntryId },
    /// User asked for a stop-then-run cycle.
    RestartRequested { id: EntryId },
    /// Force an entry back to Idle, clearing output and any stored handle
    /// reference (recovery from a stuck Error state).
    ResetRequested { id: EntryId },
    /// Register a new entry for this path.
    AddScript { id: EntryId, path: PathBuf },
    /// Delete an entry, terminating it first if it is running.
    RemoveScript { id: EntryId },
    /// Flip an entry's autostart flag.
    ToggleAutoStart { id: EntryId },
    /// Clear an entry's captured output.
    ClearOutput { id: EntryId },
    /// Change the shared output-buffer limit.
    SetOutputLimit { limit: OutputLimit },
    /// The backend spawned a child for this run.
    Spawned {
        id: EntryId,
        generation: u64,
        pid: u32,
    },
    /// The backend failed to spawn a child for this run.
    SpawnFailed {
        id: EntryId,
        generation: u64,
        error: String,
    },
    /// A batch of output lines arrived from a run's output channel.
    Output {
        id: EntryId,
        generation: u64,
        lines: Vec<String>,
    },
    /// A run's child exited.
    Exited {
        id: EntryId,
        generation: u64,
        exit: ExitKind,
    },
    /// A previously armed timer elapsed.
    TimerElapsed(TimerKind),
    /// Terminate every running script and stop the loop.
    ShutdownRequested,
}

/// Timers the shell arms on behalf of the core.
///
/// Each kind carries what the core needs to validate the fire on arrival:
/// entry ids and the generation current at arm time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Throttle window for an entry's coalesced output notification.
    ThrottleWindow { id: EntryId, generation: u64 },
    /// Reset of the global new-activity flag.
    ActivityReset { generation: u64 },
    /// Settle delay after a stopped child's exit event.
    StopSettle { id: EntryId, generation: u64 },
    /// Pause between the stop and run phases of a restart.
    RestartDelay { id: EntryId },
    /// Startup delay before autostart entries launch.
    Autostart,
}

/// State-change notifications consumed by the display layer.
///
/// Notifications are hints to refresh, not the state itself: the observable
/// state is always queried through snapshots, so a dropped notification can
/// never leave a consumer permanently stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An entry's lifecycle status changed.
    StatusChanged { id: EntryId, status: ScriptStatus },
    /// Coalesced "new output arrived" signal for one entry.
    OutputUpdated { id: EntryId },
    /// The global new-activity flag flipped.
    ActivityChanged { active: bool },
    /// An entry's captured output was cleared.
    OutputCleared { id: EntryId },
    EntryAdded { id: EntryId },
    EntryRemoved { id: EntryId },
    AutoStartChanged { id: EntryId, auto_start: bool },
    /// The shared output-buffer limit changed.
    LimitChanged { limit: OutputLimit },
}

/// Messages accepted by the supervisor loop's inbox.
///
/// Plain state transitions ride [`SupervisorEvent`]; the remaining variants
/// carry reply channels the pure core must never see.
#[derive(Debug)]
pub enum Message {
    Event(SupervisorEvent),
    /// Stop with a completion that resolves after the exit event has been
    /// processed plus the settle delay (immediately if nothing is running).
    Stop {
        id: EntryId,
        done: oneshot::Sender<()>,
    },
    /// All entries in display order.
    Snapshot {
        reply: oneshot::Sender<Vec<EntrySnapshot>>,
    },
    /// One entry by id.
    SnapshotOne {
        id: EntryId,
        reply: oneshot::Sender<Option<EntrySnapshot>>,
    },
    /// Terminate everything, stop the loop, resolve `done` once the loop
    /// has fully exited.
    Shutdown { done: oneshot::Sender<()> },
}

/// Sender used by process backends to deliver child events (spawn results
/// are returned directly; output batches and exits arrive through this).
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Message>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Deliver one event to the supervisor loop.
    ///
    /// Fails only when the supervisor has shut down, in which case the
    /// sending task should simply finish.
    pub async fn send(&self, event: SupervisorEvent) -> Result<()> {
        self.tx
            .send(Message::Event(event))
            .await
            .map_err(|_| ScriptError::SupervisorClosed)
    }
}

/// Inbox for the supervisor loop. Bounded so chatty children get
/// backpressure instead of unbounded queueing; the loop never sends into
/// its own inbox, so the bound cannot deadlock it.
pub(crate) fn inbox_channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(256)
}
