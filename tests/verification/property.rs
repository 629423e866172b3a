//! Property-based tests for the wire codec, the event cache, worker timelines and frame
//! accumulation.
//!
//! These use the exposed `__internal` module to drive components directly.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use proptest::prelude::*;
use selenia_replay::__internal::{
    decode_base91, encode_base91, parse_frame_delta, split_teleport_events, unpack_digit_pairs,
};
use selenia_replay::codec::delta::DecodeContext;
use selenia_replay::telemetry::{CollectingObserver, InvariantChecker, ViolationKind};
use selenia_replay::{
    AnimWindow, BuildingId, Event, EventCache, EventKind, FrameInfo, ReplayBuilder, ReplayConfig,
    TeleportPayload, WorkerTimeline,
};
use std::sync::Arc;

// ============================================================================
// Strategies
// ============================================================================

/// Worker lists as the server packs them: the leading code is never 0.
fn packable_codes() -> impl Strategy<Value = Vec<u8>> {
    (1u8..100, prop::collection::vec(0u8..100, 0..24)).prop_map(|(head, tail)| {
        let mut codes = vec![head];
        codes.extend(tail);
        codes
    })
}

#[derive(Debug, Clone)]
enum Mutation {
    Freeze(f64),
    Add(u8, f64),
    Remove(u8, f64),
}

fn progress() -> impl Strategy<Value = f64> {
    prop_oneof![0.0f64..=1.0, (0u32..=10).prop_map(|i| f64::from(i) / 10.0)]
}

fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        progress().prop_map(Mutation::Freeze),
        (0u8..6, progress()).prop_map(|(w, p)| Mutation::Add(w, p)),
        (0u8..6, progress()).prop_map(|(w, p)| Mutation::Remove(w, p)),
    ]
}

fn apply(timeline: &mut WorkerTimeline, mutation: &Mutation) {
    match *mutation {
        Mutation::Freeze(p) => timeline.freeze_at(p),
        Mutation::Add(w, p) => timeline.add_at(w, p),
        Mutation::Remove(w, p) => timeline.remove_first_at(w, p),
    }
}

/// `(from, to, start, duration, passengers)` between buildings 1..=4.
fn pod_line() -> impl Strategy<Value = (i32, i32, i64, i64, Vec<u8>)> {
    (
        1i32..=4,
        1i32..=4,
        0i64..900,
        1i64..100,
        prop::collection::vec(1u8..6, 1..4),
    )
}

/// A quiet frame record carrying `events`.
fn frame_text(events: &[String]) -> String {
    let mut lines = vec!["0".to_string(), "0".to_string(), events.len().to_string()];
    lines.extend(events.iter().cloned());
    lines.join("\n")
}

// ============================================================================
// Numeric codec
// ============================================================================

proptest! {
    /// Packing then unpacking reproduces the sequence.
    #[test]
    fn prop_base91_round_trip(codes in packable_codes()) {
        let text = encode_base91(&codes).unwrap();
        let decoded = unpack_digit_pairs(&decode_base91(&text).unwrap());
        prop_assert_eq!(decoded, codes);
    }

    /// Any text over the alphabet decodes, and re-encoding its pairs is stable.
    #[test]
    fn prop_base91_decode_is_canonical(text in "[0-9A-Za-z]{1,12}") {
        let pairs = unpack_digit_pairs(&decode_base91(&text).unwrap());
        prop_assert!(pairs.iter().all(|&p| p < 100));
        if pairs.first().is_some_and(|&p| p != 0) {
            let again = encode_base91(&pairs).unwrap();
            prop_assert_eq!(unpack_digit_pairs(&decode_base91(&again).unwrap()), pairs);
        }
    }
}

// ============================================================================
// Event cache
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The cache never grows past its capacity, and references past it are misses.
    #[test]
    fn prop_cache_is_bounded(capacity in 1usize..40, events in 0usize..120) {
        let observer = Arc::new(CollectingObserver::new());
        let mut cache = EventCache::with_capacity(capacity);
        let ctx = DecodeContext::default().with_observer(Some(observer.clone()));

        let lines: Vec<String> = (0..events)
            .map(|i| format!("2 0 10 1 2 {} 3S", i))
            .collect();
        let text = frame_text(&lines);
        parse_frame_delta(&text, &mut cache, &ctx).unwrap();
        prop_assert_eq!(cache.len(), events.min(capacity));
        prop_assert_eq!(observer.has_violation(ViolationKind::EventCache), events > capacity);

        // A reference to the first event that did not fit resolves to a placeholder.
        observer.clear();
        let miss = format!("0\n0\n1\n{}", capacity);
        let delta = parse_frame_delta(&miss, &mut cache, &ctx).unwrap();
        prop_assert!(delta.events[0].is_placeholder());
        prop_assert!(observer.has_violation(ViolationKind::EventCache));
        prop_assert!(cache.len() <= capacity);
    }
}

// ============================================================================
// Timelines
// ============================================================================

proptest! {
    /// Strictly increasing, non-negative progress after any mutation sequence.
    #[test]
    fn prop_timeline_stays_sorted(
        start in prop::collection::vec(0u8..6, 0..5),
        mutations in prop::collection::vec(mutation(), 0..60),
    ) {
        let mut timeline = WorkerTimeline::starting_with(&start);
        for m in &mutations {
            apply(&mut timeline, m);
        }
        prop_assert!(timeline.check_invariants().is_ok());
        let progresses: Vec<f64> = timeline.checkpoints().iter().map(|c| c.progress).collect();
        prop_assert!(progresses.iter().all(|&p| p >= 0.0));
        prop_assert!(progresses.windows(2).all(|w| w[0] < w[1]));
    }

    /// A worker count never exceeds what was started with plus what was added.
    #[test]
    fn prop_removal_never_invents_workers(
        mutations in prop::collection::vec(mutation(), 0..60),
    ) {
        let mut timeline = WorkerTimeline::starting_with(&[1, 2]);
        let mut added = [0usize; 6];
        for m in &mutations {
            if let Mutation::Add(w, _) = m {
                added[usize::from(*w)] += 1;
            }
            apply(&mut timeline, m);
        }
        for checkpoint in timeline.checkpoints() {
            for w in 0u8..6 {
                let initial = usize::from(w == 1 || w == 2);
                prop_assert!(checkpoint.count_of(w) <= initial + added[usize::from(w)]);
            }
        }
    }

    /// Freezing twice at the same instant is the same as freezing once.
    #[test]
    fn prop_freeze_is_idempotent(
        mutations in prop::collection::vec(mutation(), 0..30),
        p in progress(),
    ) {
        let mut timeline = WorkerTimeline::starting_with(&[3]);
        for m in &mutations {
            apply(&mut timeline, m);
        }
        let mut once = timeline.clone();
        once.freeze_at(p);
        let mut twice = once.clone();
        twice.freeze_at(p);
        prop_assert_eq!(once, twice);
    }
}

// ============================================================================
// Teleport splitting
// ============================================================================

proptest! {
    /// One event per worker, starts spaced by the interval, every unit the same length.
    #[test]
    fn prop_teleport_split_cardinality(
        counts in prop::collection::vec((1u8..10, 0u32..5), 1..5),
        start in 0.0f64..500.0,
        interval in 1.0f64..50.0,
        unit in 1.0f64..200.0,
    ) {
        let total: u32 = counts.iter().map(|&(_, n)| n).sum();
        let grouped = Event::new(
            EventKind::TeleporterTransport {
                from: BuildingId::new(1),
                to: BuildingId::new(2),
                payload: TeleportPayload::Grouped { interval, unit_duration: unit, counts },
            },
            AnimWindow::new(start, start),
        );
        let split = split_teleport_events(vec![grouped]);
        prop_assert_eq!(split.len(), total as usize);
        for (k, event) in split.iter().enumerate() {
            prop_assert!((event.window.start - (start + k as f64 * interval)).abs() < 1e-9);
            prop_assert!((event.window.duration() - unit).abs() < 1e-9);
            let is_single = matches!(
                event.kind,
                EventKind::TeleporterTransport { payload: TeleportPayload::Single { .. }, .. }
            );
            prop_assert!(is_single);
        }
    }
}

// ============================================================================
// Accumulation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Frames built from arbitrary pod traffic keep every timeline sorted, and replaying the
    /// same payloads gives the same frames.
    #[test]
    fn prop_accumulation_is_sorted_and_deterministic(
        frames in prop::collection::vec(prop::collection::vec(pod_line(), 0..8), 1..6),
    ) {
        let global = "0\n0\n100\n100\n0\n-1\n4\n1 0 10 10\n2 1 20 80\n3 2 80 20\n4 3 90 90\n0";
        let run = || {
            let mut session = ReplayBuilder::new()
                .with_config(ReplayConfig::deterministic(3))
                .start_plaintext(global)
                .unwrap();
            for (n, pods) in frames.iter().enumerate() {
                let lines: Vec<String> = pods
                    .iter()
                    .enumerate()
                    .map(|(i, (from, to, start, len, workers))| {
                        let packed = encode_base91(workers).unwrap();
                        format!("2 {} {} {} {} {} {}", start, start + len, from, to, i, packed)
                    })
                    .collect();
                let text = frame_text(&lines);
                session
                    .handle_frame_plaintext(FrameInfo::new(n as u32, 1000.0, 0.0), &text)
                    .unwrap();
            }
            session
        };

        let session = run();
        for frame in session.frames() {
            for building in &frame.city.buildings {
                prop_assert!(building.timeline.check_invariants().is_ok());
                prop_assert!(building.timeline.checkpoints().iter().all(|c| c.progress >= 0.0));
            }
        }
        let again = run();
        prop_assert_eq!(session.frames().len(), again.frames().len());
        for (a, b) in session.frames().iter().zip(again.frames()) {
            prop_assert_eq!(a.as_ref(), b.as_ref());
        }
    }
}
