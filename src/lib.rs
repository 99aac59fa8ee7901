// src/lib.rs

//! Supervisor for user-registered shell scripts: a durable registry, one
//! process per running entry, bounded captured output, and coalesced
//! change notifications, all serialized on a single event loop.

pub mod buffer;
pub mod config;
pub mod entry;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod proc;
pub mod registry;
pub mod supervisor;
pub mod throttle;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::Timing;
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::proc::{ProcessBackend, RealProcessBackend};
use crate::registry::Store;
use crate::supervisor::{
    EventSender, NotificationReceiver, SupervisorCore, SupervisorHandle, SupervisorRuntime,
    inbox_channel,
};

/// High-level entry point wiring a supervisor together.
pub struct Supervisor;

impl Supervisor {
    /// Start a supervisor with production wiring: the store at its default
    /// per-user location, the real filesystem, real OS processes, and stock
    /// timing. Must be called within a Tokio runtime.
    pub fn start() -> Result<(SupervisorHandle, NotificationReceiver)> {
        let store = Store::default_location()?;
        Self::spawn(
            store,
            Timing::default(),
            RealProcessBackend::new(),
            Arc::new(RealFileSystem),
        )
    }

    /// Start a supervisor from explicit parts.
    ///
    /// This is the seam tests use: a store in a temp dir, shortened timing,
    /// a fake process backend, a mock filesystem. Loads the persisted
    /// registry (a corrupt store file fails here), then spawns the loop and
    /// hands back the caller-facing ends.
    pub fn spawn<B>(
        store: Store,
        timing: Timing,
        backend: B,
        fs: Arc<dyn FileSystem>,
    ) -> Result<(SupervisorHandle, NotificationReceiver)>
    where
        B: ProcessBackend + 'static,
    {
        let file = store.load()?;
        let core = SupervisorCore::from_store(&file, timing, fs);

        let (tx, rx) = inbox_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let handle = SupervisorHandle::new(tx.clone());
        let events = EventSender::new(tx);
        let runtime = SupervisorRuntime::new(core, store, backend, rx, events, notify_tx);
        tokio::spawn(runtime.run());

        info!(scripts = file.scripts.len(), "supervisor started");
        Ok((handle, notify_rx))
    }
}
