// tests/buffer_properties.rs

//! Property tests for the output buffer's retention policy and the
//! throttle's minimum-gap guarantee.

use std::time::{Duration, Instant};

use proptest::prelude::*;

use scriptherd::buffer::{OutputBuffer, OutputLimit};
use scriptherd::config::MAX_OUTPUT_LIMIT;
use scriptherd::entry::EntryId;
use scriptherd::throttle::{ThrottleDecision, UpdateThrottle};

/// Naive reference model: every appended line, truncated to the newest N.
fn model_tail(batches: &[Vec<String>], limit: usize) -> Vec<String> {
    let mut all: Vec<String> = batches.iter().flatten().cloned().collect();
    if all.len() > limit {
        all.drain(..all.len() - limit);
    }
    all
}

fn batches_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    proptest::collection::vec(
        proptest::collection::vec("[a-z0-9 ]{0,12}", 0..6),
        0..20,
    )
}

proptest! {
    #[test]
    fn line_limit_always_keeps_the_newest_lines(
        batches in batches_strategy(),
        limit in 1..40usize,
    ) {
        let mut buffer = OutputBuffer::new(OutputLimit::Lines(limit));
        let id = EntryId::new();
        for batch in &batches {
            buffer.append(id, batch.clone());
            prop_assert!(buffer.line_count(id) <= limit);
        }
        prop_assert_eq!(buffer.lines(id), model_tail(&batches, limit));
    }

    #[test]
    fn unlimited_buffer_keeps_everything(batches in batches_strategy()) {
        let mut buffer = OutputBuffer::new(OutputLimit::Unlimited);
        let id = EntryId::new();
        for batch in &batches {
            buffer.append(id, batch.clone());
        }
        let all: Vec<String> = batches.into_iter().flatten().collect();
        prop_assert_eq!(buffer.lines(id), all);
    }

    #[test]
    fn disabled_buffer_stores_nothing(batches in batches_strategy()) {
        let mut buffer = OutputBuffer::new(OutputLimit::Disabled);
        let id = EntryId::new();
        for batch in &batches {
            buffer.append(id, batch.clone());
        }
        prop_assert_eq!(buffer.line_count(id), 0);
    }

    #[test]
    fn raw_limit_mapping_is_total(raw in proptest::num::i64::ANY) {
        let limit = OutputLimit::from_raw(raw);
        match limit {
            OutputLimit::Disabled => prop_assert_eq!(raw, 0),
            OutputLimit::Unlimited => prop_assert!(raw < 0),
            OutputLimit::Lines(n) => {
                prop_assert!(raw > 0);
                prop_assert!(n as i64 <= MAX_OUTPUT_LIMIT);
                prop_assert_eq!(n as i64, raw.min(MAX_OUTPUT_LIMIT));
            }
        }
    }

    /// Simulate the throttle exactly the way the supervisor loop drives it:
    /// immediate fires on `update`, one armed trailing timer whose stale
    /// generations never deliver. Deliveries must never be closer than the
    /// interval, and the last event must always end up represented.
    #[test]
    fn throttle_deliveries_respect_the_minimum_gap(
        mut offsets in proptest::collection::vec(0..500u64, 1..40),
    ) {
        const WINDOW_MS: u64 = 100;
        offsets.sort_unstable();

        let base = Instant::now();
        let at = |ms: u64| base + Duration::from_millis(ms);

        let mut throttle = UpdateThrottle::new(Duration::from_millis(WINDOW_MS));
        let id = EntryId::new();

        let mut fires: Vec<u64> = Vec::new();
        let mut armed: Option<(u64, u64)> = None; // (deadline_ms, generation)

        for &t in &offsets {
            if let Some((deadline, generation)) = armed {
                if deadline <= t {
                    if throttle.on_timer(id, generation, at(deadline)) {
                        fires.push(deadline);
                    }
                    armed = None;
                }
            }
            match throttle.update(id, at(t)) {
                ThrottleDecision::Fire => fires.push(t),
                ThrottleDecision::Arm { generation } => {
                    armed = Some((t + WINDOW_MS, generation));
                }
            }
        }
        if let Some((deadline, generation)) = armed {
            if throttle.on_timer(id, generation, at(deadline)) {
                fires.push(deadline);
            }
        }

        prop_assert!(!fires.is_empty(), "events always produce a delivery");
        for pair in fires.windows(2) {
            prop_assert!(
                pair[1] - pair[0] >= WINDOW_MS,
                "deliveries {}ms and {}ms are closer than the window",
                pair[0],
                pair[1]
            );
        }
        let last_event = *offsets.last().unwrap();
        let last_fire = *fires.last().unwrap();
        prop_assert!(
            last_fire >= last_event,
            "the newest output was never covered by a delivery"
        );
    }
}
