#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use scriptherd::Supervisor;
use scriptherd::config::Timing;
use scriptherd::entry::{EntryId, EntrySnapshot, ScriptStatus};
use scriptherd::errors::Result;
use scriptherd::fs::mock::MockFileSystem;
use scriptherd::registry::{ScriptRecord, Store, StoreFile};
use scriptherd::supervisor::{Notification, NotificationReceiver, SupervisorHandle};
use tempfile::TempDir;

use crate::fake_backend::FakeProcessBackend;

/// Builder for a supervisor wired entirely out of test doubles: a store in
/// a temp dir, a mock filesystem, a fake process backend, fast timing.
pub struct SupervisorBuilder {
    timing: Timing,
    file: StoreFile,
    fs: MockFileSystem,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            timing: Timing::fast(),
            file: StoreFile::default(),
            fs: MockFileSystem::new(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Persisted output-buffer limit: `0` disabled, `-1` unlimited, `N`.
    pub fn with_output_limit(mut self, limit: i64) -> Self {
        self.file.output_buffer_limit = limit;
        self
    }

    /// Seed a persisted script whose path exists on the mock filesystem.
    pub fn with_script(mut self, path: &str, auto_start: bool) -> Self {
        self.fs.add_file(path);
        self.file.scripts.push(ScriptRecord {
            path: path.into(),
            auto_start,
        });
        self
    }

    /// Seed a persisted script whose path does not exist.
    pub fn with_missing_script(mut self, path: &str, auto_start: bool) -> Self {
        self.file.scripts.push(ScriptRecord {
            path: path.into(),
            auto_start,
        });
        self
    }

    /// Persist the seeded store and start the supervisor.
    pub fn start(self) -> Result<TestSupervisor> {
        let tmp = tempfile::tempdir()?;
        let store = Store::at_path(tmp.path().join("scripts.toml"));
        store.save(&self.file)?;

        let backend = FakeProcessBackend::new();
        let (handle, notifications) = Supervisor::spawn(
            store.clone(),
            self.timing,
            backend.clone(),
            Arc::new(self.fs.clone()),
        )?;

        Ok(TestSupervisor {
            handle,
            notifications,
            backend,
            fs: self.fs,
            store,
            _tmp: tmp,
        })
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running supervisor plus handles to all of its test doubles.
///
/// The temp dir backing the store lives as long as this struct.
pub struct TestSupervisor {
    pub handle: SupervisorHandle,
    pub notifications: NotificationReceiver,
    pub backend: FakeProcessBackend,
    pub fs: MockFileSystem,
    pub store: Store,
    _tmp: TempDir,
}

impl TestSupervisor {
    /// Id of the entry with this display name.
    pub async fn id_of(&self, name: &str) -> EntryId {
        self.handle
            .entries()
            .await
            .expect("supervisor gone")
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
            .unwrap_or_else(|| panic!("no entry named {name:?}"))
    }

    /// Poll until the entry reaches the given status, returning its
    /// snapshot. Panics after 5 seconds.
    pub async fn wait_for_status(&self, id: EntryId, status: ScriptStatus) -> EntrySnapshot {
        let handle = self.handle.clone();
        wait_until(move || {
            let handle = handle.clone();
            async move {
                handle
                    .entry(id)
                    .await
                    .expect("supervisor gone")
                    .filter(|snapshot| snapshot.status == status)
            }
        })
        .await
    }

    /// Poll until the entry's captured output contains this line.
    pub async fn wait_for_output_line(&self, id: EntryId, line: &str) -> EntrySnapshot {
        let handle = self.handle.clone();
        let line = line.to_string();
        wait_until(move || {
            let handle = handle.clone();
            let line = line.clone();
            async move {
                handle
                    .entry(id)
                    .await
                    .expect("supervisor gone")
                    .filter(|snapshot| snapshot.output.iter().any(|l| l == &line))
            }
        })
        .await
    }
}

/// Poll an async probe every few milliseconds until it yields `Some`.
/// Panics after 5 seconds.
pub async fn wait_until<F, Fut, T>(mut probe: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe().await {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within 5 seconds");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receive notifications until one matches the predicate. Panics if the
/// stream closes or 5 seconds pass first.
pub async fn wait_for_notification<F>(rx: &mut NotificationReceiver, mut pred: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(notification)) if pred(&notification) => return notification,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("notification stream closed"),
            Err(_) => panic!("matching notification not seen within 5 seconds"),
        }
    }
}

/// Pull everything currently queued on the notification stream.
pub fn drain_notifications(rx: &mut NotificationReceiver) -> Vec<Notification> {
    let mut drained = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        drained.push(notification);
    }
    drained
}
