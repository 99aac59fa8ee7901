// src/buffer.rs

//! Bounded per-entry output storage.
//!
//! One [`OutputLimit`] governs every entry: `Disabled` drops appends
//! entirely, `Unlimited` grows without bound, `Lines(n)` keeps only the
//! newest `n` lines and discards the oldest on overflow.

use std::collections::{HashMap, VecDeque};

use crate::config::MAX_OUTPUT_LIMIT;
use crate::entry::EntryId;

/// Retention policy shared by all entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLimit {
    /// Appended lines are dropped; buffers stay empty.
    Disabled,
    /// Buffers grow without bound.
    Unlimited,
    /// Keep only the newest N lines.
    Lines(usize),
}

impl OutputLimit {
    /// Interpret a persisted numeric limit: `0` disabled, negative values
    /// unlimited, positive values clamped to [`MAX_OUTPUT_LIMIT`].
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => OutputLimit::Disabled,
            n if n < 0 => OutputLimit::Unlimited,
            n => OutputLimit::Lines(n.min(MAX_OUTPUT_LIMIT) as usize),
        }
    }

    /// Numeric form used by the store: `0` / `-1` / `N`.
    pub fn as_raw(self) -> i64 {
        match self {
            OutputLimit::Disabled => 0,
            OutputLimit::Unlimited => -1,
            OutputLimit::Lines(n) => n as i64,
        }
    }
}

/// Per-entry line store.
#[derive(Debug)]
pub struct OutputBuffer {
    limit: OutputLimit,
    lines: HashMap<EntryId, VecDeque<String>>,
}

impl OutputBuffer {
    pub fn new(limit: OutputLimit) -> Self {
        Self {
            limit,
            lines: HashMap::new(),
        }
    }

    pub fn limit(&self) -> OutputLimit {
        self.limit
    }

    /// Append a batch of lines for one entry, then truncate to the newest N
    /// under a line limit. No-op while disabled.
    pub fn append(&mut self, id: EntryId, batch: impl IntoIterator<Item = String>) {
        if self.limit == OutputLimit::Disabled {
            return;
        }

        let buf = self.lines.entry(id).or_default();
        buf.extend(batch);

        if let OutputLimit::Lines(n) = self.limit {
            while buf.len() > n {
                buf.pop_front();
            }
        }
    }

    /// Append a single line (diagnostics, stop markers).
    pub fn push(&mut self, id: EntryId, line: String) {
        self.append(id, std::iter::once(line));
    }

    /// Empty one entry's buffer. Cancelling the entry's pending throttle
    /// state is the caller's responsibility.
    pub fn clear(&mut self, id: EntryId) {
        if let Some(buf) = self.lines.get_mut(&id) {
            buf.clear();
        }
    }

    /// Drop one entry's storage entirely (entry removal).
    pub fn remove(&mut self, id: EntryId) {
        self.lines.remove(&id);
    }

    /// Lines currently retained for an entry, oldest first.
    pub fn lines(&self, id: EntryId) -> Vec<String> {
        self.lines
            .get(&id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn line_count(&self, id: EntryId) -> usize {
        self.lines.get(&id).map(VecDeque::len).unwrap_or(0)
    }

    /// Change the shared limit, eagerly re-truncating existing buffers so
    /// the retention invariant holds immediately rather than on next append.
    pub fn set_limit(&mut self, limit: OutputLimit) {
        self.limit = limit;
        match limit {
            OutputLimit::Disabled => {
                for buf in self.lines.values_mut() {
                    buf.clear();
                }
            }
            OutputLimit::Lines(n) => {
                for buf in self.lines.values_mut() {
                    while buf.len() > n {
                        buf.pop_front();
                    }
                }
            }
            OutputLimit::Unlimited => {}
        }
    }
}
