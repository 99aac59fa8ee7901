use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use scriptherd::entry::{EntryId, ExitKind};
use scriptherd::proc::ProcessBackend;
use scriptherd::supervisor::{EventSender, SupervisorEvent};

/// How the fake treats a spawn request for a given path.
#[derive(Debug, Clone)]
pub enum SpawnBehavior {
    /// The child stays "running" until terminated or driven via
    /// [`FakeProcessBackend::exit`]. The default.
    StayRunning,
    /// The child exits immediately with this kind.
    ExitWith(ExitKind),
    /// The spawn attempt itself fails with this message.
    FailSpawn(String),
}

/// One successful spawn observed by the fake.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub id: EntryId,
    pub generation: u64,
    pub path: PathBuf,
    pub pid: u32,
}

#[derive(Debug, Clone, Copy)]
struct LiveRun {
    generation: u64,
}

#[derive(Debug, Default)]
struct FakeState {
    spawned: Mutex<Vec<SpawnRecord>>,
    live: Mutex<HashMap<EntryId, LiveRun>>,
    terminated: Mutex<Vec<EntryId>>,
    behaviors: Mutex<HashMap<PathBuf, SpawnBehavior>>,
    events: Mutex<Option<EventSender>>,
}

/// A fake process backend that spawns nothing.
///
/// It records spawn and terminate calls, hands out synthetic pids, and lets
/// the test drive output batches and exits for the run the supervisor
/// believes is live. Clones share state, so a test can keep one clone while
/// the supervisor owns the other.
#[derive(Debug, Clone)]
pub struct FakeProcessBackend {
    next_pid: Arc<AtomicU32>,
    state: Arc<FakeState>,
}

impl Default for FakeProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessBackend {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            state: Arc::default(),
        }
    }

    fn record_spawn(&self, id: EntryId, generation: u64, path: PathBuf, pid: u32) {
        self.state.spawned.lock().unwrap().push(SpawnRecord {
            id,
            generation,
            path,
            pid,
        });
        self.state
            .live
            .lock()
            .unwrap()
            .insert(id, LiveRun { generation });
    }

    /// Script the fake's reaction to future spawns of this path.
    pub fn set_behavior(&self, path: impl Into<PathBuf>, behavior: SpawnBehavior) {
        self.state
            .behaviors
            .lock()
            .unwrap()
            .insert(path.into(), behavior);
    }

    /// All successful spawns, in order.
    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.state.spawned.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.spawned.lock().unwrap().len()
    }

    /// Entries the supervisor asked to terminate, in order.
    pub fn terminate_calls(&self) -> Vec<EntryId> {
        self.state.terminated.lock().unwrap().clone()
    }

    /// Whether the fake still holds a live run for this entry.
    pub fn is_live(&self, id: EntryId) -> bool {
        self.state.live.lock().unwrap().contains_key(&id)
    }

    /// Deliver an output batch for the entry's live run.
    pub async fn emit_output(&self, id: EntryId, lines: Vec<String>) {
        let run = self
            .state
            .live
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .expect("no live run to emit output for");
        let events = self.sender();
        events
            .send(SupervisorEvent::Output {
                id,
                generation: run.generation,
                lines,
            })
            .await
            .expect("supervisor gone while emitting output");
    }

    /// End the entry's live run with the given exit kind.
    pub async fn exit(&self, id: EntryId, exit: ExitKind) {
        let run = self
            .state
            .live
            .lock()
            .unwrap()
            .remove(&id)
            .expect("no live run to exit");
        let events = self.sender();
        events
            .send(SupervisorEvent::Exited {
                id,
                generation: run.generation,
                exit,
            })
            .await
            .expect("supervisor gone while emitting exit");
    }

    fn sender(&self) -> EventSender {
        self.state
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no spawn happened yet; no event sender captured")
    }

    fn behavior_for(&self, path: &PathBuf) -> SpawnBehavior {
        self.state
            .behaviors
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or(SpawnBehavior::StayRunning)
    }
}

impl ProcessBackend for FakeProcessBackend {
    fn spawn(
        &mut self,
        id: EntryId,
        generation: u64,
        path: PathBuf,
        events: EventSender,
    ) -> Result<u32> {
        *self.state.events.lock().unwrap() = Some(events.clone());

        match self.behavior_for(&path) {
            SpawnBehavior::FailSpawn(message) => bail!("{message}"),
            SpawnBehavior::StayRunning => {
                let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
                self.record_spawn(id, generation, path, pid);
                Ok(pid)
            }
            SpawnBehavior::ExitWith(exit) => {
                let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
                self.record_spawn(id, generation, path, pid);
                self.state.live.lock().unwrap().remove(&id);
                tokio::spawn(async move {
                    let _ = events
                        .send(SupervisorEvent::Exited {
                            id,
                            generation,
                            exit,
                        })
                        .await;
                });
                Ok(pid)
            }
        }
    }

    fn terminate(&mut self, id: EntryId) {
        self.state.terminated.lock().unwrap().push(id);
        let run = self.state.live.lock().unwrap().remove(&id);
        let events = self.state.events.lock().unwrap().clone();
        if let (Some(run), Some(events)) = (run, events) {
            tokio::spawn(async move {
                let _ = events
                    .send(SupervisorEvent::Exited {
                        id,
                        generation: run.generation,
                        exit: ExitKind::Signaled,
                    })
                    .await;
            });
        }
    }

    fn terminate_all(&mut self) {
        let ids: Vec<EntryId> = self.state.live.lock().unwrap().keys().copied().collect();
        for id in ids {
            self.terminate(id);
        }
    }
}
