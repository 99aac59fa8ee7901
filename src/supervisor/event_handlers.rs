// src/supervisor/event_handlers.rs

//! Event handling logic for the supervisor core.
//!
//! Every handler takes the core plus one event's payload and returns a
//! [`Step`]: state mutations happen immediately, side effects (spawning,
//! signalling, timers, persistence, notifications) come back as [`Command`]s
//! for the IO shell.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use crate::buffer::OutputLimit;
use crate::entry::{EntryId, ExitKind, ScriptEntry, ScriptStatus};
use crate::errors::ScriptError;
use crate::supervisor::core::SupervisorCore;
use crate::supervisor::{Notification, TimerKind};
use crate::throttle::ThrottleDecision;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum Command {
    /// Spawn a child for this run of the entry.
    Spawn {
        id: EntryId,
        generation: u64,
        path: PathBuf,
    },
    /// Send the terminate signal to the entry's live child, if any.
    Terminate { id: EntryId },
    /// Terminate every live child (shutdown).
    TerminateAll,
    /// Arm a one-shot timer; the shell sends `TimerElapsed(kind)` back after
    /// the delay.
    ArmTimer {
        kind: TimerKind,
        delay: std::time::Duration,
    },
    /// Resolve any pending stop completions for this entry.
    CompleteStop { id: EntryId },
    /// Persist the registry document.
    Persist { file: crate::registry::StoreFile },
    /// Publish a notification to the display layer.
    Publish(Notification),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct Step {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<Command>,
    /// Whether the supervisor loop should keep running.
    pub keep_running: bool,
}

impl Step {
    /// Step that keeps the loop running.
    pub fn running(commands: Vec<Command>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    /// Step with no side effects at all.
    pub fn noop() -> Self {
        Self::running(Vec::new())
    }
}

/// Handle a user `run` request. Silent no-op when the path is missing or the
/// entry is already running.
pub fn handle_run_requested(core: &mut SupervisorCore, id: EntryId, now: Instant) -> Step {
    Step::running(launch(core, id, MissingPath::Ignore, now))
}

/// Handle a user `stop` request.
pub fn handle_stop_requested(core: &mut SupervisorCore, id: EntryId, now: Instant) -> Step {
    Step::running(begin_stop(core, id, now))
}

/// Handle a user `restart` request: stop, then (after the restart delay) run
/// again. The run phase re-checks the path and surfaces a missing one as an
/// entry error, since the user explicitly asked for a relaunch.
pub fn handle_restart_requested(core: &mut SupervisorCore, id: EntryId, now: Instant) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Step::noop();
    };
    entry.restart_pending = true;
    Step::running(begin_stop(core, id, now))
}

/// Handle a user `reset` request: force Idle, clear output, drop the stored
/// handle reference. Does not touch the OS process; a run generation bump
/// makes any in-flight exit or output event for the old run stale.
pub fn handle_reset_requested(core: &mut SupervisorCore, id: EntryId) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Step::noop();
    };

    entry.status = ScriptStatus::Idle;
    entry.pid = None;
    entry.stopping = false;
    entry.restart_pending = false;
    entry.generation += 1;

    core.buffer.clear(id);
    core.throttle.invalidate(id);

    debug!(id = %id, "entry reset to idle");

    Step::running(vec![
        Command::Publish(Notification::StatusChanged {
            id,
            status: ScriptStatus::Idle,
        }),
        Command::Publish(Notification::OutputCleared { id }),
        // A pending stop for the abandoned run can never settle now.
        Command::CompleteStop { id },
    ])
}

/// Register a new entry. An inaccessible path marks the entry Error with a
/// diagnostic line but still inserts it; validity is re-checked on each run.
pub fn handle_add_script(
    core: &mut SupervisorCore,
    id: EntryId,
    path: PathBuf,
    now: Instant,
) -> Step {
    let missing = !core.fs.exists(&path);
    let diagnostic = missing.then(|| ScriptError::PathNotFound(path.clone()).to_string());
    let mut entry = ScriptEntry::new(id, path, false);
    if missing {
        entry.status = ScriptStatus::Error;
    }

    core.entries.insert(id, entry);
    core.order.push(id);
    core.sort_order();

    let mut commands = vec![Command::Publish(Notification::EntryAdded { id })];
    if let Some(line) = diagnostic {
        commands.push(Command::Publish(Notification::StatusChanged {
            id,
            status: ScriptStatus::Error,
        }));
        commands.extend(append_lines(core, id, vec![line], now));
    }
    commands.push(core.persist_command());

    debug!(id = %id, missing, "script added");
    Step::running(commands)
}

/// Delete an entry: terminate a live child, invalidate throttle state, drop
/// all storage, persist.
pub fn handle_remove_script(core: &mut SupervisorCore, id: EntryId) -> Step {
    let Some(entry) = core.entries.remove(&id) else {
        return Step::noop();
    };
    core.order.retain(|other| *other != id);
    core.buffer.remove(id);
    core.throttle.remove(id);

    let mut commands = Vec::new();
    if entry.pid.is_some() {
        commands.push(Command::Terminate { id });
    }
    commands.push(Command::CompleteStop { id });
    commands.push(Command::Publish(Notification::EntryRemoved { id }));
    commands.push(core.persist_command());

    debug!(id = %id, was_running = entry.pid.is_some(), "script removed");
    Step::running(commands)
}

/// Flip an entry's autostart flag and persist.
pub fn handle_toggle_auto_start(core: &mut SupervisorCore, id: EntryId) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Step::noop();
    };
    entry.auto_start = !entry.auto_start;
    let auto_start = entry.auto_start;

    Step::running(vec![
        Command::Publish(Notification::AutoStartChanged { id, auto_start }),
        core.persist_command(),
    ])
}

/// Clear an entry's output and cancel its pending throttle state, so no
/// stale coalesced notification fires against the cleared buffer.
pub fn handle_clear_output(core: &mut SupervisorCore, id: EntryId) -> Step {
    if !core.entries.contains_key(&id) {
        return Step::noop();
    }
    core.buffer.clear(id);
    core.throttle.invalidate(id);
    Step::running(vec![Command::Publish(Notification::OutputCleared { id })])
}

/// Change the shared output-buffer limit, persist it, and refresh displays.
pub fn handle_set_output_limit(core: &mut SupervisorCore, limit: OutputLimit) -> Step {
    core.buffer.set_limit(limit);
    Step::running(vec![
        Command::Publish(Notification::LimitChanged { limit }),
        core.persist_command(),
    ])
}

/// The backend spawned a child: attach the handle and go Running.
pub fn handle_spawned(core: &mut SupervisorCore, id: EntryId, generation: u64, pid: u32) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        warn!(id = %id, pid, "spawn result for unknown entry");
        return Step::noop();
    };
    if entry.generation != generation {
        warn!(id = %id, pid, "spawn result for stale run generation");
        return Step::noop();
    }

    entry.status = ScriptStatus::Running;
    entry.pid = Some(pid);

    debug!(id = %id, pid, "script running");
    Step::running(vec![Command::Publish(Notification::StatusChanged {
        id,
        status: ScriptStatus::Running,
    })])
}

/// The backend failed to spawn: Error plus exactly one diagnostic line, no
/// handle retained.
pub fn handle_spawn_failed(
    core: &mut SupervisorCore,
    id: EntryId,
    generation: u64,
    error: String,
    now: Instant,
) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Step::noop();
    };
    if entry.generation != generation {
        return Step::noop();
    }

    entry.status = ScriptStatus::Error;
    entry.pid = None;
    entry.stopping = false;

    let mut commands = vec![Command::Publish(Notification::StatusChanged {
        id,
        status: ScriptStatus::Error,
    })];
    let line = ScriptError::SpawnFailure(error).to_string();
    commands.extend(append_lines(core, id, vec![line], now));

    Step::running(commands)
}

/// A batch of output lines from a run's channel. Batches from a stale run
/// generation (reset, remove, respawn happened since) are dropped.
pub fn handle_output(
    core: &mut SupervisorCore,
    id: EntryId,
    generation: u64,
    lines: Vec<String>,
    now: Instant,
) -> Step {
    let Some(entry) = core.entries.get(&id) else {
        return Step::noop();
    };
    if entry.generation != generation {
        debug!(id = %id, "dropping output batch from stale run");
        return Step::noop();
    }

    Step::running(append_lines(core, id, lines, now))
}

/// A run's child exited. Signal termination (including our own stop) and a
/// zero exit code map to Idle; a non-zero exit code maps to Error with one
/// diagnostic line. Always clears the handle slot.
pub fn handle_exited(
    core: &mut SupervisorCore,
    id: EntryId,
    generation: u64,
    exit: ExitKind,
    now: Instant,
) -> Step {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Step::noop();
    };
    if entry.generation != generation {
        debug!(id = %id, ?exit, "ignoring exit of stale run");
        return Step::noop();
    }

    entry.pid = None;
    let was_stopping = entry.stopping;
    entry.stopping = false;

    let status = match exit {
        ExitKind::Clean | ExitKind::Signaled => ScriptStatus::Idle,
        ExitKind::Code(_) => ScriptStatus::Error,
    };
    entry.status = status;

    debug!(id = %id, ?exit, ?status, was_stopping, "script exited");

    let mut commands = vec![Command::Publish(Notification::StatusChanged { id, status })];
    if let ExitKind::Code(code) = exit {
        let line = ScriptError::AbnormalExit(code).to_string();
        commands.extend(append_lines(core, id, vec![line], now));
    }
    if was_stopping {
        commands.push(Command::ArmTimer {
            kind: TimerKind::StopSettle { id, generation },
            delay: core.timing.stop_settle,
        });
    }

    Step::running(commands)
}

/// Dispatch an elapsed timer. Stale generations and vanished entries are
/// ignored; that is the whole cancellation model.
pub fn handle_timer(core: &mut SupervisorCore, kind: TimerKind, now: Instant) -> Step {
    match kind {
        TimerKind::ThrottleWindow { id, generation } => {
            if core.throttle.on_timer(id, generation, now) {
                Step::running(fire_output_notification(core, id))
            } else {
                Step::noop()
            }
        }
        TimerKind::ActivityReset { generation } => {
            if generation == core.activity_generation && core.activity {
                core.activity = false;
                Step::running(vec![Command::Publish(Notification::ActivityChanged {
                    active: false,
                })])
            } else {
                Step::noop()
            }
        }
        TimerKind::StopSettle { id, generation } => {
            let Some(entry) = core.entries.get(&id) else {
                return Step::noop();
            };
            if entry.generation != generation {
                return Step::noop();
            }
            let mut commands = vec![Command::CompleteStop { id }];
            if entry.restart_pending {
                commands.push(Command::ArmTimer {
                    kind: TimerKind::RestartDelay { id },
                    delay: core.timing.restart_delay,
                });
            }
            Step::running(commands)
        }
        TimerKind::RestartDelay { id } => {
            let Some(entry) = core.entries.get_mut(&id) else {
                return Step::noop();
            };
            if !entry.restart_pending {
                return Step::noop();
            }
            entry.restart_pending = false;
            Step::running(launch(core, id, MissingPath::MarkError, now))
        }
        TimerKind::Autostart => {
            let eligible: Vec<EntryId> = core
                .order
                .iter()
                .copied()
                .filter(|id| {
                    core.entries
                        .get(id)
                        .is_some_and(|e| e.auto_start && e.status == ScriptStatus::Idle)
                })
                .collect();

            let mut commands = Vec::new();
            for id in eligible {
                commands.extend(launch(core, id, MissingPath::Ignore, now));
            }
            Step::running(commands)
        }
    }
}

/// What `launch` should do when the script path is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissingPath {
    /// Silent no-op (direct runs and autostart).
    Ignore,
    /// Mark the entry Error with a diagnostic line (restart's run phase).
    MarkError,
}

/// Start a run for an entry: bump the run generation, clear old output and
/// pending throttle state, and command a spawn. No-op while Running.
pub(crate) fn launch(
    core: &mut SupervisorCore,
    id: EntryId,
    on_missing: MissingPath,
    now: Instant,
) -> Vec<Command> {
    let Some(entry) = core.entries.get_mut(&id) else {
        return Vec::new();
    };

    if entry.status == ScriptStatus::Running {
        debug!(id = %id, "run ignored; already running");
        return Vec::new();
    }

    if !core.fs.exists(&entry.path) {
        debug!(id = %id, path = ?entry.path, "run skipped; path not accessible");
        return match on_missing {
            MissingPath::Ignore => Vec::new(),
            MissingPath::MarkError => {
                entry.status = ScriptStatus::Error;
                let line = ScriptError::PathNotFound(entry.path.clone()).to_string();
                let mut commands = vec![Command::Publish(Notification::StatusChanged {
                    id,
                    status: ScriptStatus::Error,
                })];
                commands.extend(append_lines(core, id, vec![line], now));
                commands
            }
        };
    }

    entry.generation += 1;
    entry.stopping = false;
    entry.restart_pending = false;
    let generation = entry.generation;
    let path = entry.path.clone();

    core.buffer.clear(id);
    core.throttle.invalidate(id);

    vec![
        Command::Publish(Notification::OutputCleared { id }),
        Command::Spawn {
            id,
            generation,
            path,
        },
    ]
}

/// Begin stopping an entry. With no live handle this is a no-op that still
/// resolves the completion (and still chains into a pending restart).
pub(crate) fn begin_stop(core: &mut SupervisorCore, id: EntryId, now: Instant) -> Vec<Command> {
    let Some(entry) = core.entries.get_mut(&id) else {
        return vec![Command::CompleteStop { id }];
    };

    if entry.pid.is_none() {
        let mut commands = vec![Command::CompleteStop { id }];
        if entry.restart_pending {
            commands.push(Command::ArmTimer {
                kind: TimerKind::RestartDelay { id },
                delay: core.timing.restart_delay,
            });
        }
        return commands;
    }

    entry.stopping = true;

    let mut commands = append_lines(
        core,
        id,
        vec!["Process terminated by user".to_string()],
        now,
    );
    commands.push(Command::Terminate { id });
    commands
}

/// Append lines through the shared output path: buffer, then throttle.
///
/// With the buffer disabled this is a full no-op — no storage and no
/// notifications, matching the append guard the rest of the design assumes.
pub(crate) fn append_lines(
    core: &mut SupervisorCore,
    id: EntryId,
    lines: Vec<String>,
    now: Instant,
) -> Vec<Command> {
    if lines.is_empty() || core.buffer.limit() == OutputLimit::Disabled {
        return Vec::new();
    }

    core.buffer.append(id, lines);

    match core.throttle.update(id, now) {
        ThrottleDecision::Fire => fire_output_notification(core, id),
        ThrottleDecision::Arm { generation } => vec![Command::ArmTimer {
            kind: TimerKind::ThrottleWindow { id, generation },
            delay: core.timing.throttle_interval,
        }],
    }
}

/// Deliver the coalesced "output updated" signal for an entry and refresh
/// the global activity flag, rearming its reset timer.
pub(crate) fn fire_output_notification(core: &mut SupervisorCore, id: EntryId) -> Vec<Command> {
    let mut commands = vec![Command::Publish(Notification::OutputUpdated { id })];

    core.activity_generation += 1;
    commands.push(Command::ArmTimer {
        kind: TimerKind::ActivityReset {
            generation: core.activity_generation,
        },
        delay: core.timing.activity_duration,
    });

    if !core.activity {
        core.activity = true;
        commands.push(Command::Publish(Notification::ActivityChanged {
            active: true,
        }));
    }

    commands
}
