// src/supervisor/runtime.rs

//! Async shell around the supervisor core.
//!
//! The runtime owns the inbox, the process backend, the store, and the
//! notification sender. It feeds each message to [`SupervisorCore::step`]
//! and executes the returned commands. Commands whose execution produces an
//! immediate result (a spawn attempt) are fed straight back into the core
//! as follow-up events before the next inbox message, so an entry is never
//! observable between "spawn commanded" and "spawn resolved".
//!
//! The loop never sends into its own inbox; that keeps the bounded inbox
//! free of self-deadlock.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::entry::EntryId;
use crate::proc::ProcessBackend;
use crate::registry::Store;
use crate::supervisor::core::SupervisorCore;
use crate::supervisor::event_handlers::{Command, Step};
use crate::supervisor::{EventSender, Message, Notification, SupervisorEvent};

/// The supervisor's event loop.
pub struct SupervisorRuntime<B: ProcessBackend> {
    core: SupervisorCore,
    inbox: mpsc::Receiver<Message>,
    events: EventSender,
    backend: B,
    store: Store,
    notify_tx: mpsc::UnboundedSender<Notification>,

    /// Stop completions waiting for an entry's stop to settle.
    pending_stops: HashMap<EntryId, Vec<oneshot::Sender<()>>>,
}

impl<B: ProcessBackend> SupervisorRuntime<B> {
    pub fn new(
        core: SupervisorCore,
        store: Store,
        backend: B,
        inbox: mpsc::Receiver<Message>,
        events: EventSender,
        notify_tx: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            core,
            inbox,
            events,
            backend,
            store,
            notify_tx,
            pending_stops: HashMap::new(),
        }
    }

    /// Run the loop until shutdown is requested or every handle is gone.
    pub async fn run(mut self) {
        info!("supervisor loop started");

        let startup = self.core.startup(Instant::now());
        let mut keep_running = self.execute_step(startup);
        let mut shutdown_done: Option<oneshot::Sender<()>> = None;

        while keep_running {
            let Some(message) = self.inbox.recv().await else {
                break;
            };

            match message {
                Message::Event(event) => {
                    let step = self.core.step(event, Instant::now());
                    keep_running = self.execute_step(step);
                }
                Message::Stop { id, done } => {
                    self.pending_stops.entry(id).or_default().push(done);
                    let step = self
                        .core
                        .step(SupervisorEvent::StopRequested { id }, Instant::now());
                    keep_running = self.execute_step(step);
                }
                Message::Snapshot { reply } => {
                    let _ = reply.send(self.core.snapshots());
                }
                Message::SnapshotOne { id, reply } => {
                    let _ = reply.send(self.core.snapshot(id));
                }
                Message::Shutdown { done } => {
                    let step = self
                        .core
                        .step(SupervisorEvent::ShutdownRequested, Instant::now());
                    keep_running = self.execute_step(step);
                    shutdown_done = Some(done);
                }
            }
        }

        // Nothing can settle once the loop is gone; release every waiter.
        for (_, waiters) in self.pending_stops.drain() {
            for done in waiters {
                let _ = done.send(());
            }
        }
        if let Some(done) = shutdown_done {
            let _ = done.send(());
        }

        info!("supervisor loop finished");
    }

    /// Execute one step's commands, feeding spawn results back into the
    /// core until the command queue drains.
    fn execute_step(&mut self, step: Step) -> bool {
        let mut keep_running = step.keep_running;
        let mut queue: VecDeque<Command> = step.commands.into();

        while let Some(command) = queue.pop_front() {
            if let Some(event) = self.execute_command(command) {
                let follow_up = self.core.step(event, Instant::now());
                keep_running &= follow_up.keep_running;
                queue.extend(follow_up.commands);
            }
        }

        keep_running
    }

    /// Execute a single command, returning any follow-up event for the core.
    fn execute_command(&mut self, command: Command) -> Option<SupervisorEvent> {
        match command {
            Command::Spawn {
                id,
                generation,
                path,
            } => match self.backend.spawn(id, generation, path, self.events.clone()) {
                Ok(pid) => Some(SupervisorEvent::Spawned {
                    id,
                    generation,
                    pid,
                }),
                Err(err) => {
                    warn!(id = %id, error = %err, "spawn failed");
                    Some(SupervisorEvent::SpawnFailed {
                        id,
                        generation,
                        error: format!("{err:#}"),
                    })
                }
            },
            Command::Terminate { id } => {
                self.backend.terminate(id);
                None
            }
            Command::TerminateAll => {
                self.backend.terminate_all();
                None
            }
            Command::ArmTimer { kind, delay } => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SupervisorEvent::TimerElapsed(kind)).await;
                });
                None
            }
            Command::CompleteStop { id } => {
                if let Some(waiters) = self.pending_stops.remove(&id) {
                    for done in waiters {
                        let _ = done.send(());
                    }
                }
                None
            }
            Command::Persist { file } => {
                if let Err(err) = self.store.save(&file) {
                    warn!(error = %err, "failed to persist registry");
                }
                None
            }
            Command::Publish(notification) => {
                let _ = self.notify_tx.send(notification);
                None
            }
        }
    }
}
