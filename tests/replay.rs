//! End-to-end replay scenarios: compressed payloads in, cumulative frames out.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use std::sync::Arc;

use common::{info, FrameFixture, GlobalFixture};
use selenia_replay::telemetry::{CollectingObserver, ViolationKind, ViolationSeverity};
use selenia_replay::{
    assert_no_violations, assert_violation, snapshot, BuildingId, CachePolicy, EventKind,
    EventType, FrameInfo, ReplayBuilder, ReplayConfig, ReplayError, ReplaySession,
};

fn id(raw: i32) -> BuildingId {
    BuildingId::new(raw)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn session_with(global: &GlobalFixture, observer: &Arc<CollectingObserver>) -> ReplaySession {
    ReplayBuilder::new()
        .with_config(ReplayConfig::deterministic(42))
        .with_violation_observer(observer.clone())
        .start(&global.compressed())
        .unwrap()
}

#[test]
fn pod_transport_scenario() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(99, 5, 90, 90);
    let mut session = session_with(&global, &observer);

    // Put a type-3 and a type-7 worker on building 1 first.
    let arrival = FrameFixture::new().event(EventType::ShuttleArrival, 0, 500, &[1, 0, 0, 1, 0, 0, 0, 1]);
    session.handle_frame(info(0), &arrival.compressed()).unwrap();

    let delta = FrameFixture::new().pod(0, 100, 1, 99, 42, &[3, 7]);
    let frame = session.handle_frame(info(1), &delta.compressed()).unwrap();

    let pods: Vec<_> = frame.events_of(EventType::PodTransport).collect();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].kind.params(), vec![1, 99, 42, 3, 7]);
    assert!(close(pods[0].window.end, 0.1));

    let origin = &frame.building(id(1)).unwrap().timeline;
    assert_eq!(origin.state_at(0.0), &[3, 7]);
    assert!(origin.state_at(0.05).is_empty());

    let destination = &frame.building(id(99)).unwrap().timeline;
    assert!(destination.state_at(0.09).is_empty());
    assert_eq!(destination.state_at(0.1), &[3, 7]);
    assert_eq!(destination.next_state_at(0.09), &[3, 7]);

    assert_no_violations!(observer);
}

#[test]
fn month_end_leaves_buildings_unchanged() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(2, 1, 20, 20)
        .resources(500);
    let mut session = session_with(&global, &observer);

    let first = session
        .handle_frame(info(0), &FrameFixture::new().compressed())
        .unwrap();
    assert_eq!(first.city.resources, 500);

    let delta = FrameFixture::new().month_end(77, 1200);
    let frame = session.handle_frame(info(1), &delta.compressed()).unwrap();

    assert!(frame.is_month_end);
    assert!(!frame.is_new_month);
    assert_eq!(frame.score, 77);
    assert_eq!(frame.city.resources, 1200);
    let ids: Vec<_> = frame.city.buildings.iter().map(|b| b.id()).collect();
    let previous: Vec<_> = first.city.buildings.iter().map(|b| b.id()).collect();
    assert_eq!(ids, previous);
}

#[test]
fn new_month_introduces_buildings_and_advances_calendar() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new().building(1, 0, 10, 10);
    let mut session = session_with(&global, &observer);

    let delta = FrameFixture::new().new_month(3, vec![(2, 4, 40, 40), (3, 5, 60, 60)], 900);
    let frame = session.handle_frame(info(0), &delta.compressed()).unwrap();
    assert_eq!((frame.day, frame.month, frame.score), (1, 1, 3));
    assert_eq!(frame.city.buildings.len(), 3);
    assert_eq!(frame.city.resources, 900);

    let next = session
        .handle_frame(info(1), &FrameFixture::new().compressed())
        .unwrap();
    assert_eq!((next.day, next.month, next.score), (2, 1, 3));
    assert_eq!(next.city.resources, 900);
}

#[test]
fn back_references_reuse_cached_pods() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(2, 5, 30, 30);
    let mut session = session_with(&global, &observer);

    let first = FrameFixture::new()
        .event(EventType::BuildTube, 0, 10, &[1, 2])
        .pod(0, 100, 1, 2, 7, &[4]);
    session.handle_frame(info(0), &first.compressed()).unwrap();
    // Only the pod is cached by default.
    assert_eq!(session.cache().len(), 1);

    let second = FrameFixture::new().cached(0).cached(0);
    let frame = session.handle_frame(info(1), &second.compressed()).unwrap();
    assert_eq!(frame.events.len(), 2);
    assert_eq!(frame.events[0].kind.params(), vec![1, 2, 7, 4]);
    assert_eq!(frame.building(id(2)).unwrap().timeline.last().unwrap().workers.to_vec(), vec![4, 4, 4]);
    assert_eq!(frame.tube(id(2), id(1)).unwrap().capacity, 1);
    assert_no_violations!(observer);
}

#[test]
fn referee_compatible_sessions_index_every_event() {
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(2, 5, 30, 30);
    let mut session = ReplayBuilder::new()
        .with_config(ReplayConfig::referee_compatible())
        .start_plaintext(&global.plaintext())
        .unwrap();
    assert_eq!(session.config().cache_policy, CachePolicy::EveryDecodedEvent);

    let first = FrameFixture::new()
        .event(EventType::BuildTube, 0, 10, &[1, 2])
        .event(EventType::UpgradeTube, 10, 20, &[1, 2, 1]);
    session.handle_frame(info(0), &first.compressed()).unwrap();
    assert_eq!(session.cache().len(), 2);

    let frame = session
        .handle_frame(info(1), &FrameFixture::new().cached(1).compressed())
        .unwrap();
    assert_eq!(frame.tube(id(1), id(2)).unwrap().capacity, 3);
}

#[test]
fn stale_back_reference_becomes_a_placeholder() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new().building(1, 0, 10, 10);
    let mut session = session_with(&global, &observer);

    let frame = session
        .handle_frame(info(0), &FrameFixture::new().cached(12).compressed())
        .unwrap();
    assert_eq!(frame.events.len(), 1);
    assert!(frame.events[0].is_placeholder());
    assert_violation!(observer, ViolationKind::EventCache);
    assert!(!observer.has_severity(ViolationSeverity::Critical));
}

#[test]
fn grouped_teleports_are_split_with_curves() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(2, 3, 80, 10);
    let mut session = session_with(&global, &observer);

    let delta = FrameFixture::new()
        .event(EventType::NewTeleporter, 0, 10, &[1, 2])
        .event(EventType::TeleporterTransport, 100, 0, &[1, 2, 50, 200, 6, 2, 3, 1]);
    let frame = session.handle_frame(info(0), &delta.compressed()).unwrap();

    let teleports: Vec<_> = frame.teleports().collect();
    assert_eq!(teleports.len(), 3);
    assert!(close(teleports[2].0.window.start, 0.2));
    assert!(close(teleports[2].0.window.end, 0.4));
    for (_, curve) in &teleports {
        assert!((10.0..20.0).contains(&curve.init_speed));
        assert!((0.0..std::f64::consts::TAU).contains(&curve.target_angle));
    }

    let exit = frame.building(id(2)).unwrap();
    assert!(exit.has_teleporter);
    assert!(!exit.is_teleporter_entrance);
    assert_eq!(exit.settled_workers, 1);
    assert_eq!(exit.timeline.last().unwrap().workers.to_vec(), vec![6, 6]);
    assert_eq!(frame.city.teleporters.len(), 1);
    assert_no_violations!(observer);
}

#[test]
fn shuttle_arrivals_carry_phase_parameters() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new().building(1, 0, 50, 50);
    let mut session = session_with(&global, &observer);

    let delta = FrameFixture::new().event(EventType::ShuttleArrival, 0, 1000, &[1, 2, 0, 1]);
    let frame = session.handle_frame(info(0), &delta.compressed()).unwrap();

    let arrivals: Vec<_> = frame.arrivals().collect();
    assert_eq!(arrivals.len(), 1);
    let params = arrivals[0].1;
    assert!(params.fly_in_end > 0.0 && params.fly_in_end < params.shake_out_workers_end);
    assert!(close(params.shake_out_workers_end - params.fly_in_end, 0.4));

    let timeline = &frame.building(id(1)).unwrap().timeline;
    assert!(timeline.state_at(params.fly_in_end).is_empty());
    assert_eq!(timeline.state_at(1.0), &[1, 1, 3]);
}

#[test]
fn dangling_references_are_skipped_or_fatal() {
    let global = GlobalFixture::new().building(1, 0, 10, 10);
    let delta = FrameFixture::new().pod(0, 100, 1, 5, 1, &[2]);

    let observer = Arc::new(CollectingObserver::new());
    let mut lenient = session_with(&global, &observer);
    lenient.handle_frame(info(0), &delta.compressed()).unwrap();
    assert!(observer.has_severity(ViolationSeverity::Critical));
    assert_violation!(observer, ViolationKind::DanglingReference);

    let mut strict = ReplayBuilder::new()
        .with_config(ReplayConfig::strict())
        .start(&global.compressed())
        .unwrap();
    let err = strict.handle_frame(info(0), &delta.compressed()).unwrap_err();
    assert_eq!(
        err,
        ReplayError::UnknownBuilding {
            building: id(5),
            context: "pod-transport"
        }
    );
    assert!(strict.latest().is_none());
}

#[test]
fn broken_transport_is_reported_per_stage() {
    let global = GlobalFixture::new();
    let mut session = ReplayBuilder::new().start(&global.compressed()).unwrap();
    let err = session.handle_frame(info(0), "not base64!").unwrap_err();
    assert!(matches!(err, ReplayError::Decompression { .. }));

    // The session is still usable.
    session
        .handle_frame(info(0), &FrameFixture::new().compressed())
        .unwrap();
}

#[test]
fn history_links_and_snapshots() {
    let observer = Arc::new(CollectingObserver::new());
    let global = GlobalFixture::new()
        .building(1, 0, 10, 10)
        .building(2, 5, 30, 30);
    let mut session = session_with(&global, &observer);
    for n in 0..5 {
        let delta = FrameFixture::new().pod(0, 500, 1, 2, n as i32, &[3]);
        session
            .handle_frame(FrameInfo::new(n, 1000.0, 0.0), &delta.compressed())
            .unwrap();
    }
    let frames = session.frames();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[4].previous().info.number, 3);
    assert_eq!(frames[0].previous().info.number, 0);
    assert_eq!(frames[4].building(id(2)).unwrap().timeline.last().unwrap().workers.len(), 5);

    let decoded = snapshot::decode(&snapshot::encode(&frames[4]).unwrap()).unwrap();
    assert_eq!(decoded, *frames[4]);
    assert!(matches!(decoded.events[0].kind, EventKind::PodTransport { .. }));
}
