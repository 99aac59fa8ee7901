// src/supervisor/core.rs

//! Pure supervisor state machine.
//!
//! [`SupervisorCore`] owns every piece of mutable supervisor state: the
//! entry map and its display order, the shared output buffer, the
//! notification throttle, and the global activity flag. It performs no IO;
//! [`step`](SupervisorCore::step) mutates state and returns the side
//! effects as [`Command`]s for the runtime to execute. Tests can drive it
//! event by event with hand-picked instants.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{OutputBuffer, OutputLimit};
use crate::config::Timing;
use crate::entry::{EntryId, EntrySnapshot, ScriptEntry, ScriptStatus};
use crate::errors::ScriptError;
use crate::fs::FileSystem;
use crate::registry::{ScriptRecord, StoreFile, sort_key};
use crate::supervisor::event_handlers::{self, Command, Step, append_lines};
use crate::supervisor::{Notification, SupervisorEvent, TimerKind};
use crate::throttle::UpdateThrottle;

/// State machine behind the supervisor loop.
#[derive(Debug)]
pub struct SupervisorCore {
    pub(crate) entries: HashMap<EntryId, ScriptEntry>,
    /// Display order of entry ids, kept sorted by case-insensitive filename.
    pub(crate) order: Vec<EntryId>,
    pub(crate) buffer: OutputBuffer,
    pub(crate) throttle: UpdateThrottle,
    pub(crate) timing: Timing,
    pub(crate) fs: Arc<dyn FileSystem>,

    /// Global "output arrived recently" flag.
    pub(crate) activity: bool,
    /// Stamp for the pending activity-reset timer; a fire with a stale
    /// stamp was superseded by newer output and is ignored.
    pub(crate) activity_generation: u64,
}

impl SupervisorCore {
    /// Empty core.
    pub fn new(timing: Timing, limit: OutputLimit, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            buffer: OutputBuffer::new(limit),
            throttle: UpdateThrottle::new(timing.throttle_interval),
            timing,
            fs,
            activity: false,
            activity_generation: 0,
        }
    }

    /// Core seeded from a loaded store document. Records are expected in
    /// display order (the store sorts on load); each gets a fresh id.
    pub fn from_store(file: &StoreFile, timing: Timing, fs: Arc<dyn FileSystem>) -> Self {
        let mut core = Self::new(timing, OutputLimit::from_raw(file.output_buffer_limit), fs);
        for record in &file.scripts {
            let id = EntryId::new();
            core.entries
                .insert(id, ScriptEntry::new(id, record.path.clone(), record.auto_start));
            core.order.push(id);
        }
        core
    }

    /// One-time startup step, run before the loop consumes its inbox.
    ///
    /// Autostart entries whose path is already gone are placed in Error with
    /// a diagnostic line and never launched; if any launchable autostart
    /// entry remains, the autostart timer is armed.
    pub fn startup(&mut self, now: Instant) -> Step {
        let mut commands = Vec::new();
        let mut any_eligible = false;

        for id in self.order.clone() {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if !entry.auto_start {
                continue;
            }
            if self.fs.exists(&entry.path) {
                any_eligible = true;
                continue;
            }

            entry.status = ScriptStatus::Error;
            let line = ScriptError::PathNotFound(entry.path.clone()).to_string();
            commands.push(Command::Publish(Notification::StatusChanged {
                id,
                status: ScriptStatus::Error,
            }));
            commands.extend(append_lines(self, id, vec![line], now));
        }

        if any_eligible {
            commands.push(Command::ArmTimer {
                kind: TimerKind::Autostart,
                delay: self.timing.autostart_delay,
            });
        }

        Step::running(commands)
    }

    /// Advance the state machine by one event.
    pub fn step(&mut self, event: SupervisorEvent, now: Instant) -> Step {
        match event {
            SupervisorEvent::RunRequested { id } => {
                event_handlers::handle_run_requested(self, id, now)
            }
            SupervisorEvent::StopRequested { id } => {
                event_handlers::handle_stop_requested(self, id, now)
            }
            SupervisorEvent::RestartRequested { id } => {
                event_handlers::handle_restart_requested(self, id, now)
            }
            SupervisorEvent::ResetRequested { id } => {
                event_handlers::handle_reset_requested(self, id)
            }
            SupervisorEvent::AddScript { id, path } => {
                event_handlers::handle_add_script(self, id, path, now)
            }
            SupervisorEvent::RemoveScript { id } => {
                event_handlers::handle_remove_script(self, id)
            }
            SupervisorEvent::ToggleAutoStart { id } => {
                event_handlers::handle_toggle_auto_start(self, id)
            }
            SupervisorEvent::ClearOutput { id } => event_handlers::handle_clear_output(self, id),
            SupervisorEvent::SetOutputLimit { limit } => {
                event_handlers::handle_set_output_limit(self, limit)
            }
            SupervisorEvent::Spawned {
                id,
                generation,
                pid,
            } => event_handlers::handle_spawned(self, id, generation, pid),
            SupervisorEvent::SpawnFailed {
                id,
                generation,
                error,
            } => event_handlers::handle_spawn_failed(self, id, generation, error, now),
            SupervisorEvent::Output {
                id,
                generation,
                lines,
            } => event_handlers::handle_output(self, id, generation, lines, now),
            SupervisorEvent::Exited {
                id,
                generation,
                exit,
            } => event_handlers::handle_exited(self, id, generation, exit, now),
            SupervisorEvent::TimerElapsed(kind) => event_handlers::handle_timer(self, kind, now),
            SupervisorEvent::ShutdownRequested => Step {
                commands: vec![Command::TerminateAll],
                keep_running: false,
            },
        }
    }

    /// Snapshots of all entries, in display order.
    pub fn snapshots(&self) -> Vec<EntrySnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.snapshot(*id))
            .collect()
    }

    /// Snapshot of one entry.
    pub fn snapshot(&self, id: EntryId) -> Option<EntrySnapshot> {
        self.entries.get(&id).map(|entry| EntrySnapshot {
            id: entry.id,
            name: entry.name(),
            path: entry.path.clone(),
            status: entry.status,
            auto_start: entry.auto_start,
            pid: entry.pid,
            output: self.buffer.lines(id),
        })
    }

    /// Current global activity flag.
    pub fn has_activity(&self) -> bool {
        self.activity
    }

    /// Current shared output-buffer limit.
    pub fn output_limit(&self) -> OutputLimit {
        self.buffer.limit()
    }

    /// The store document describing current registry state.
    pub fn to_store_file(&self) -> StoreFile {
        StoreFile {
            output_buffer_limit: self.buffer.limit().as_raw(),
            scripts: self
                .order
                .iter()
                .filter_map(|id| self.entries.get(id))
                .map(|entry| ScriptRecord {
                    path: entry.path.clone(),
                    auto_start: entry.auto_start,
                })
                .collect(),
        }
    }

    /// Persist command carrying the current registry state.
    pub(crate) fn persist_command(&self) -> Command {
        Command::Persist {
            file: self.to_store_file(),
        }
    }

    /// Re-sort the display order after an insertion.
    pub(crate) fn sort_order(&mut self) {
        let entries = &self.entries;
        self.order.sort_by_key(|id| {
            entries
                .get(id)
                .map(|entry| sort_key(&entry.path))
                .unwrap_or_default()
        });
    }
}
