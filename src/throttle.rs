// src/throttle.rs

//! Per-entry leading/trailing notification throttle.
//!
//! Pure state: a last-fire instant, a pending flag, and a timer generation
//! per entry. The caller (the supervisor loop) owns actual timers; this
//! module only decides. Cancel-then-rearm is expressed by bumping the
//! generation — a timer that fires with a stale generation is ignored, so
//! there is never more than one live window timer per entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::entry::EntryId;

/// What the supervisor loop should do with an output event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Outside the window: notify immediately.
    Fire,
    /// Inside the window: the event is recorded as pending; (re)arm a
    /// full-interval timer carrying this generation.
    Arm { generation: u64 },
}

#[derive(Debug, Default)]
struct EntryThrottle {
    last_fire: Option<Instant>,
    pending: bool,
    generation: u64,
}

/// Rate limiter coalescing bursts of output events into at most one
/// notification per interval, per entry.
///
/// Per-entry state is created lazily on the first event for that entry.
#[derive(Debug)]
pub struct UpdateThrottle {
    interval: Duration,
    entries: HashMap<EntryId, EntryThrottle>,
}

impl UpdateThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record an output event at `now`.
    ///
    /// Fires immediately when no fire happened within the interval;
    /// otherwise stores the event as pending and asks for a fresh window
    /// timer. A fresh fire also supersedes any armed timer, so a window
    /// never delivers both an immediate and a stale trailing notification.
    pub fn update(&mut self, id: EntryId, now: Instant) -> ThrottleDecision {
        let st = self.entries.entry(id).or_default();

        match st.last_fire {
            Some(t) if now.duration_since(t) < self.interval => {
                st.pending = true;
                st.generation += 1;
                ThrottleDecision::Arm {
                    generation: st.generation,
                }
            }
            _ => {
                st.last_fire = Some(now);
                st.pending = false;
                st.generation += 1;
                ThrottleDecision::Fire
            }
        }
    }

    /// A window timer elapsed. Returns true when the coalesced pending
    /// value should be delivered now (the generation is still current and a
    /// pending value exists); delivery updates the fire time, sliding the
    /// window.
    pub fn on_timer(&mut self, id: EntryId, generation: u64, now: Instant) -> bool {
        let Some(st) = self.entries.get_mut(&id) else {
            return false;
        };
        if st.generation != generation || !st.pending {
            return false;
        }
        st.pending = false;
        st.last_fire = Some(now);
        true
    }

    /// Cancel any armed timer and drop the pending value, without touching
    /// the fire time. Used on explicit output clear and entry removal.
    pub fn invalidate(&mut self, id: EntryId) {
        if let Some(st) = self.entries.get_mut(&id) {
            st.pending = false;
            st.generation += 1;
        }
    }

    /// Forget an entry entirely.
    pub fn remove(&mut self, id: EntryId) {
        self.entries.remove(&id);
    }
}
