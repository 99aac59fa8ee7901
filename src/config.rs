// src/config.rs

//! Process-wide constants: timing knobs and output-buffer limits.
//!
//! The supervisor's delays are deliberately not part of the public operation
//! signatures — callers get one [`Timing`] at construction and every entry
//! shares it. `Timing::default()` carries the values the whole design was
//! tuned around; tests construct much shorter ones.

use std::time::Duration;

/// Output-buffer limit applied when the store has no persisted value.
pub const DEFAULT_OUTPUT_LIMIT: i64 = 500;

/// Largest accepted output-buffer limit; persisted values above this are
/// clamped on load.
pub const MAX_OUTPUT_LIMIT: i64 = 10_000;

/// Fixed delays and windows shared by every entry in a supervisor.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Minimum interval between coalesced output notifications per entry.
    pub throttle_interval: Duration,

    /// How long the global "new activity" flag stays set after the last
    /// coalesced notification.
    pub activity_duration: Duration,

    /// Extra settle time between a child's exit event and the completion of
    /// a `stop` call. Pipe teardown can lag the exit notification.
    pub stop_settle: Duration,

    /// Pause between the stop and run phases of a restart, giving the OS
    /// time to reclaim process resources.
    pub restart_delay: Duration,

    /// Pause before autostart entries launch at load time, so the host
    /// application finishes its own initialization first.
    pub autostart_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_secs(1),
            activity_duration: Duration::from_secs(5),
            stop_settle: Duration::from_millis(100),
            restart_delay: Duration::from_millis(500),
            autostart_delay: Duration::from_millis(500),
        }
    }
}

impl Timing {
    /// Uniformly scaled-down timing for tests that drive real timers.
    pub fn fast() -> Self {
        Self {
            throttle_interval: Duration::from_millis(50),
            activity_duration: Duration::from_millis(120),
            stop_settle: Duration::from_millis(10),
            restart_delay: Duration::from_millis(20),
            autostart_delay: Duration::from_millis(10),
        }
    }
}
