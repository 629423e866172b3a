//! Merging decoded deltas into cumulative frames.
//!
//! The accumulator owns the session's persistent state (the initial city, the teleporter
//! registry, the map layout) and the most recent frame. Each call to
//! [`FrameAccumulator::accumulate`] builds a new frame on top of the previous one:
//!
//! 1. calendar and score,
//! 2. buildings carried forward (flags, settled counts, last timeline state) plus new ones,
//! 3. grouped teleports split into one event per worker,
//! 4. tubes and teleporters,
//! 5. event windows rescaled to frame-local progress,
//! 6. worker timelines built from arrivals, pods and teleports,
//! 7. a baseline checkpoint before each building's first teleport arrival,
//! 8. the link to the previous frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::animation::{ShuttleParams, TeleportCurve};
use crate::city::{Building, City, Teleporter, Tube, TubeKey};
use crate::codec::delta::{FrameDelta, GlobalData};
use crate::config::{FaultPolicy, ReplayConfig};
use crate::error::ReplayError;
use crate::event::{AnimWindow, Event, EventKind, TeleportPayload};
use crate::frame::{CumulativeFrame, FrameInfo};
use crate::layout::GameLayout;
use crate::report_violation_to;
use crate::rng::{Pcg32, SeedableRng};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::timeline::{Checkpoint, WorkerTimeline};
use crate::{BuildingId, WorkerType};

/// Day shown before the first frame. The first frame of a replay is usually a new month.
const INITIAL_DAY: u32 = 29;

/// Wire time units after which workers of a finished month have settled.
const SETTLE_TIME: f64 = 100.0;

/// Origin freeze is at the window start; passengers leave the origin at this fraction.
const POD_DEPARTURE: f64 = 0.2;

/// Destination is frozen at this fraction; passengers arrive at the window end.
const POD_APPROACH: f64 = 0.8;

/// Fraction of a teleport at which the worker fades in at the exit.
const TELEPORT_FADE_IN: f64 = 0.9;

/// Expands grouped teleports into one event per worker.
///
/// Worker `k` of a group (counting across all its pairs) starts `k * interval` after the group
/// and lasts `unit_duration`. The expanded events take the place of the first grouped teleport;
/// all other events keep their relative order.
///
/// ```
/// use selenia_replay::__internal::split_teleport_events;
/// use selenia_replay::{AnimWindow, BuildingId, Event, EventKind, TeleportPayload};
///
/// let grouped = Event::new(
///     EventKind::TeleporterTransport {
///         from: BuildingId::new(1),
///         to: BuildingId::new(2),
///         payload: TeleportPayload::Grouped {
///             interval: 10.0,
///             unit_duration: 50.0,
///             counts: vec![(4, 2), (6, 3)],
///         },
///     },
///     AnimWindow::new(100.0, 200.0),
/// );
/// let split = split_teleport_events(vec![grouped]);
/// assert_eq!(split.len(), 5);
/// assert_eq!(split[4].window, AnimWindow::new(140.0, 190.0));
/// ```
#[must_use]
pub fn split_teleport_events(events: Vec<Event>) -> Vec<Event> {
    let is_grouped = |e: &Event| {
        matches!(
            e.kind,
            EventKind::TeleporterTransport {
                payload: TeleportPayload::Grouped { .. },
                ..
            }
        )
    };
    let Some(first) = events.iter().position(is_grouped) else {
        return events;
    };

    let mut others = Vec::with_capacity(events.len());
    let mut expanded = Vec::new();
    for event in events {
        let Event { kind, window } = event;
        match kind {
            EventKind::TeleporterTransport {
                from,
                to,
                payload:
                    TeleportPayload::Grouped {
                        interval,
                        unit_duration,
                        counts,
                    },
            } => {
                let mut departures = 0u64;
                for (worker, count) in counts {
                    for _ in 0..count {
                        let start = window.start + departures as f64 * interval;
                        departures += 1;
                        expanded.push(Event::new(
                            EventKind::TeleporterTransport {
                                from,
                                to,
                                payload: TeleportPayload::Single { worker },
                            },
                            AnimWindow::new(start, start + unit_duration),
                        ));
                    }
                }
            },
            kind => others.push(Event::new(kind, window)),
        }
    }

    // Everything before the first grouped teleport is a non-teleport event.
    let tail = others.split_off(first);
    others.extend(expanded);
    others.extend(tail);
    others
}

/// A worker reaching `building` at `progress`. Workers arriving at a building of their own
/// type settle there and are never shown.
fn arrive(building: &mut Building, worker: WorkerType, progress: f64) {
    if building.building_type() == worker {
        building.settled_workers = building.settled_workers.saturating_add(1);
    } else {
        building.timeline.add_at(worker, progress);
    }
}

/// Builds cumulative frames from decoded deltas, in turn order.
pub struct FrameAccumulator {
    layout: GameLayout,
    viewport_height: f64,
    initial_city: City,
    teleporters: Vec<Teleporter>,
    dangling_references: FaultPolicy,
    teleport_seed: u64,
    observer: Option<Arc<dyn ViolationObserver>>,
    previous: Option<Arc<CumulativeFrame>>,
}

impl std::fmt::Debug for FrameAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAccumulator")
            .field("layout", &self.layout)
            .field("buildings", &self.initial_city.buildings.len())
            .field("teleporters", &self.teleporters.len())
            .field("dangling_references", &self.dangling_references)
            .field("previous", &self.previous.as_ref().map(|p| p.info.number))
            .finish_non_exhaustive()
    }
}

impl FrameAccumulator {
    /// Starts from a session header.
    #[must_use]
    pub fn new(global: &GlobalData, config: &ReplayConfig) -> Self {
        Self::with_observer(global, config, None)
    }

    /// Starts from a session header, reporting soft faults to `observer`.
    #[must_use]
    pub fn with_observer(
        global: &GlobalData,
        config: &ReplayConfig,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let mut initial_city = City::new();
        initial_city.resources = global.city.resources;
        for data in &global.city.buildings {
            if !initial_city.add_building(Building::new(*data)) {
                report_violation_to!(
                    observer,
                    None,
                    ViolationSeverity::Warning,
                    ViolationKind::WireFormat,
                    "duplicate building {} in the initial city ignored",
                    data.id
                );
            }
        }

        Self {
            layout: GameLayout::new(global, &config.viewport),
            viewport_height: config.viewport.height,
            initial_city,
            teleporters: Vec::new(),
            dangling_references: config.dangling_references,
            teleport_seed: config.teleport_seed,
            observer,
            previous: None,
        }
    }

    /// The map layout used for shuttle timing.
    #[must_use]
    pub const fn layout(&self) -> &GameLayout {
        &self.layout
    }

    /// Every teleporter installed so far, in installation order.
    #[must_use]
    pub fn teleporters(&self) -> &[Teleporter] {
        &self.teleporters
    }

    /// The most recently accumulated frame.
    #[must_use]
    pub fn latest(&self) -> Option<&Arc<CumulativeFrame>> {
        self.previous.as_ref()
    }

    /// Returns `Ok(true)` if `id` exists in `city`. A missing building is an error under
    /// [`FaultPolicy::Fail`] and a reported `Ok(false)` otherwise.
    fn require(
        &self,
        city: &City,
        id: BuildingId,
        context: &'static str,
        frame: u32,
    ) -> Result<bool, ReplayError> {
        if city.contains(id) {
            return Ok(true);
        }
        if self.dangling_references.is_fail() {
            return Err(ReplayError::UnknownBuilding {
                building: id,
                context,
            });
        }
        report_violation_to!(
            self.observer,
            Some(frame),
            ViolationSeverity::Critical,
            ViolationKind::DanglingReference,
            "{} references unknown building {}; event skipped",
            context,
            id
        );
        Ok(false)
    }

    fn require_all(
        &self,
        city: &City,
        ids: &[BuildingId],
        context: &'static str,
        frame: u32,
    ) -> Result<bool, ReplayError> {
        for &id in ids {
            if !self.require(city, id, context, frame)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Carries the previous city forward and adds the delta's new buildings.
    fn merge_city(&self, info: &FrameInfo, delta: &FrameDelta) -> City {
        let base = self
            .previous
            .as_deref()
            .map_or(&self.initial_city, |prev| &prev.city);
        let new_month = delta.is_new_month();

        let mut city = City::new();
        city.tubes = base.tubes.clone();
        city.teleporters = base.teleporters.clone();
        city.resources = delta.resources().unwrap_or(base.resources);

        let carried = base.buildings.iter().map(|b| (b.data, Some(b)));
        let introduced = delta.new_buildings().iter().map(|&data| (data, None));
        for (data, previous) in carried.chain(introduced) {
            let mut building = Building::new(data);
            let last = previous.and_then(|b| b.timeline.last());
            building.timeline = last.map_or_else(
                || WorkerTimeline::starting_with(&[]),
                |c| WorkerTimeline::starting_with(&c.workers),
            );
            if let Some(previous) = previous {
                building.has_teleporter = previous.has_teleporter;
                building.is_teleporter_entrance = previous.is_teleporter_entrance;
                building.settled_workers = previous.settled_workers;
            }
            if new_month {
                if last.is_some_and(|c| !c.workers.is_empty()) {
                    building
                        .timeline
                        .push(Checkpoint::new(SETTLE_TIME / info.duration, []));
                }
                building.settled_workers = 0;
            }

            if !city.add_building(building) {
                report_violation_to!(
                    self.observer,
                    Some(info.number),
                    ViolationSeverity::Warning,
                    ViolationKind::WireFormat,
                    "building {} introduced twice; the first definition is kept",
                    data.id
                );
            }
        }
        city
    }

    /// Tube construction, tube upgrades and teleporter registration.
    fn apply_structure(
        &mut self,
        city: &mut City,
        events: &[Event],
        frame: u32,
    ) -> Result<(), ReplayError> {
        // All constructions first, so an upgrade may precede its tube's construction.
        for event in events {
            if let EventKind::BuildTube { a, b } = event.kind {
                if !self.require_all(city, &[a, b], "build-tube", frame)? {
                    continue;
                }
                let tube = Tube::new(a, b);
                if city.tubes.insert(tube.key(), tube).is_some() {
                    report_violation_to!(
                        self.observer,
                        Some(frame),
                        ViolationSeverity::Warning,
                        ViolationKind::WireFormat,
                        "tube {} built twice; capacity reset",
                        tube.key()
                    );
                }
            }
        }

        for event in events {
            match event.kind {
                EventKind::UpgradeTube { a, b, upgrades } => {
                    let key = TubeKey::new(a, b);
                    match city.tubes.get_mut(&key) {
                        Some(tube) => tube.capacity = tube.capacity.saturating_add(upgrades),
                        None if self.dangling_references.is_fail() => {
                            return Err(ReplayError::UnknownTube { key });
                        },
                        None => {
                            report_violation_to!(
                                self.observer,
                                Some(frame),
                                ViolationSeverity::Critical,
                                ViolationKind::DanglingReference,
                                "upgrade of unknown tube {}; event skipped",
                                key
                            );
                        },
                    }
                },
                EventKind::NewTeleporter { entrance, exit } => {
                    if !self.require_all(city, &[entrance, exit], "new-teleporter", frame)? {
                        continue;
                    }
                    let teleporter = Teleporter { entrance, exit };
                    self.teleporters.push(teleporter);
                    city.teleporters.push(teleporter);
                },
                _ => {},
            }
        }
        Ok(())
    }

    /// Builds the worker timelines. Returns teleport curves and shuttle phases, aligned with
    /// the teleport and arrival events.
    fn build_timelines(
        &self,
        city: &mut City,
        events: &[Event],
        frame: u32,
    ) -> Result<(Vec<TeleportCurve>, Vec<ShuttleParams>), ReplayError> {
        let mut rng = Pcg32::seed_from_u64(self.teleport_seed ^ u64::from(frame));
        let mut teleport_curves = Vec::new();
        let mut shuttle_params = Vec::new();
        let mut first_activation: BTreeMap<BuildingId, f64> = BTreeMap::new();

        for event in events {
            let window = event.window;
            match &event.kind {
                EventKind::ShuttleArrival { landing, counts } => {
                    let found = self.require(city, *landing, "shuttle-arrival", frame)?;
                    let screen_y = city
                        .building(*landing)
                        .map_or(self.viewport_height / 2.0, |b| {
                            self.layout
                                .screen_y(f64::from(b.data.x), f64::from(b.data.y))
                        });
                    let params = ShuttleParams::for_landing(screen_y, self.viewport_height);
                    shuttle_params.push(params);
                    if !found {
                        continue;
                    }

                    let pool: Vec<WorkerType> = counts
                        .iter()
                        .enumerate()
                        .flat_map(|(i, &n)| std::iter::repeat((i + 1) as WorkerType).take(n as usize))
                        .collect();
                    let instants = params.worker_instants(&window, pool.len());
                    if let Some(building) = city.building_mut(*landing) {
                        building.timeline.freeze_at(params.shake_start(&window));
                        for (&worker, &instant) in pool.iter().zip(&instants) {
                            building.timeline.add_at(worker, instant);
                        }
                    }
                },
                EventKind::TeleporterTransport { from, to, payload } => {
                    let TeleportPayload::Single { worker } = *payload else {
                        report_violation_to!(
                            self.observer,
                            Some(frame),
                            ViolationSeverity::Error,
                            ViolationKind::InternalError,
                            "grouped teleport reached timeline construction"
                        );
                        continue;
                    };
                    teleport_curves.push(TeleportCurve::random(&mut rng));
                    if !self.require_all(city, &[*from, *to], "teleporter-transport", frame)? {
                        continue;
                    }

                    if let Some(origin) = city.building_mut(*from) {
                        origin.timeline.remove_first_at(worker, window.start);
                    }
                    if let Some(destination) = city.building_mut(*to) {
                        arrive(destination, worker, window.end);
                        if worker != destination.building_type() {
                            let fade_in = window.lerp(TELEPORT_FADE_IN);
                            first_activation
                                .entry(*to)
                                .and_modify(|t| *t = t.min(fade_in))
                                .or_insert(fade_in);
                        }
                    }
                },
                EventKind::PodTransport {
                    from, to, workers, ..
                } => {
                    if !self.require_all(city, &[*from, *to], "pod-transport", frame)? {
                        continue;
                    }
                    if let Some(origin) = city.building_mut(*from) {
                        origin.timeline.freeze_at(window.start);
                        let departure = window.lerp(POD_DEPARTURE);
                        for &worker in workers {
                            origin.timeline.remove_first_at(worker, departure);
                        }
                    }
                    if let Some(destination) = city.building_mut(*to) {
                        destination.timeline.freeze_at(window.lerp(POD_APPROACH));
                        for &worker in workers {
                            arrive(destination, worker, window.end);
                        }
                    }
                },
                EventKind::NewTeleporter { entrance, exit } => {
                    if let Some(building) = city.building_mut(*entrance) {
                        building.has_teleporter = true;
                        building.is_teleporter_entrance = true;
                    }
                    if let Some(building) = city.building_mut(*exit) {
                        building.has_teleporter = true;
                        building.is_teleporter_entrance = false;
                    }
                },
                _ => {},
            }
        }

        for (id, instant) in first_activation {
            if let Some(building) = city.building_mut(id) {
                building.timeline.freeze_at(instant);
            }
        }

        Ok((teleport_curves, shuttle_params))
    }

    /// Builds the next frame from `delta`.
    ///
    /// Nothing changes if an error is returned; the next call builds on the same previous
    /// frame.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::InvalidFrameDuration`] if `info.duration` is not finite and positive.
    /// - [`ReplayError::UnknownBuilding`] / [`ReplayError::UnknownTube`] for dangling references
    ///   under [`FaultPolicy::Fail`].
    pub fn accumulate(
        &mut self,
        info: FrameInfo,
        delta: FrameDelta,
    ) -> Result<Arc<CumulativeFrame>, ReplayError> {
        if !(info.duration.is_finite() && info.duration > 0.0) {
            return Err(ReplayError::InvalidFrameDuration {
                duration: info.duration,
            });
        }

        let previous = self.previous.clone();
        let (mut day, mut month, prev_score) = previous
            .as_deref()
            .map_or((INITIAL_DAY, 0, 0), |p| (p.day, p.month, p.score));
        if delta.is_new_month() {
            day = 1;
            month += 1;
        } else {
            day += 1;
        }
        let score = delta.score().unwrap_or(prev_score);

        let mut city = self.merge_city(&info, &delta);
        let is_new_month = delta.is_new_month();
        let is_month_end = delta.is_month_end();
        let mut events = split_teleport_events(delta.events);

        // Teleporters are registered on `self` only once the whole frame succeeds.
        let registered = self.teleporters.len();
        if let Err(err) = self.apply_structure(&mut city, &events, info.number) {
            self.teleporters.truncate(registered);
            return Err(err);
        }

        for event in &mut events {
            event.window = event.window.rescaled(info.duration);
        }

        let (teleport_curves, shuttle_params) =
            match self.build_timelines(&mut city, &events, info.number) {
                Ok(derived) => derived,
                Err(err) => {
                    self.teleporters.truncate(registered);
                    return Err(err);
                },
            };

        tracing::debug!(
            frame = info.number,
            day,
            month,
            score,
            events = events.len(),
            buildings = city.buildings.len(),
            tubes = city.tubes.len(),
            "accumulated frame"
        );

        let frame = Arc::new(CumulativeFrame {
            info,
            is_new_month,
            is_month_end,
            day,
            month,
            score,
            city,
            events,
            teleport_curves,
            shuttle_params,
            previous,
        });
        self.previous = Some(Arc::clone(&frame));
        Ok(frame)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::city::BuildingData;
    use crate::codec::delta::{CityRecord, MonthEnd, NewMonth};
    use crate::telemetry::CollectingObserver;
    use crate::PodId;

    fn data(id: i32, building_type: WorkerType, x: i32, y: i32) -> BuildingData {
        BuildingData {
            id: BuildingId::new(id),
            building_type,
            x,
            y,
        }
    }

    fn global(buildings: Vec<BuildingData>) -> GlobalData {
        GlobalData {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 100.0,
            max_y: 100.0,
            simplified: false,
            game_ratio: -1.0,
            city: CityRecord {
                buildings,
                resources: 0,
            },
        }
    }

    fn quiet(events: Vec<Event>) -> FrameDelta {
        FrameDelta {
            new_month: None,
            month_end: None,
            events,
        }
    }

    fn id(raw: i32) -> BuildingId {
        BuildingId::new(raw)
    }

    fn ev(kind: EventKind, start: f64, end: f64) -> Event {
        Event::new(kind, AnimWindow::new(start, end))
    }

    fn info(number: u32) -> FrameInfo {
        FrameInfo::new(number, 1000.0, 0.0)
    }

    fn pod(from: i32, to: i32, workers: &[WorkerType], start: f64, end: f64) -> Event {
        ev(
            EventKind::PodTransport {
                from: id(from),
                to: id(to),
                pod: PodId::new(1),
                workers: workers.iter().copied().collect(),
            },
            start,
            end,
        )
    }

    fn timeline(frame: &CumulativeFrame, building: i32) -> Vec<(f64, Vec<WorkerType>)> {
        frame
            .building(id(building))
            .unwrap()
            .timeline
            .checkpoints()
            .iter()
            .map(|c| (c.progress, c.workers.to_vec()))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn calendar_starts_at_day_29_of_month_0() {
        let mut acc = FrameAccumulator::new(&global(vec![]), &ReplayConfig::default());
        let first = acc.accumulate(info(0), quiet(vec![])).unwrap();
        assert_eq!((first.day, first.month), (30, 0));

        let new_month = FrameDelta {
            new_month: Some(NewMonth {
                score: 12,
                city: CityRecord::default(),
            }),
            month_end: None,
            events: vec![],
        };
        let second = acc.accumulate(info(1), new_month).unwrap();
        assert_eq!((second.day, second.month, second.score), (1, 1, 12));

        let third = acc.accumulate(info(2), quiet(vec![])).unwrap();
        assert_eq!((third.day, third.month, third.score), (2, 1, 12));
        assert_eq!(third.previous().info.number, 1);
    }

    #[test]
    fn month_end_updates_score_and_resources_only() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10)]),
            &ReplayConfig::default(),
        );
        acc.accumulate(info(0), quiet(vec![])).unwrap();
        let delta = FrameDelta {
            new_month: None,
            month_end: Some(MonthEnd {
                score: 40,
                resources: 250,
            }),
            events: vec![],
        };
        let frame = acc.accumulate(info(1), delta).unwrap();
        assert!(frame.is_month_end);
        assert_eq!(frame.score, 40);
        assert_eq!(frame.city.resources, 250);
        assert_eq!(frame.city.buildings.len(), 1);
    }

    #[test]
    fn pod_transport_moves_workers_between_timelines() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 5, 20, 20)]),
            &ReplayConfig::default(),
        );
        // Seed building 1 with two workers via a first frame.
        let seed = ev(
            EventKind::ShuttleArrival {
                landing: id(1),
                counts: vec![0, 0, 1, 0, 0, 0, 1],
            },
            0.0,
            100.0,
        );
        acc.accumulate(info(0), quiet(vec![seed])).unwrap();

        let frame = acc
            .accumulate(info(1), quiet(vec![pod(1, 2, &[3, 7], 0.0, 100.0)]))
            .unwrap();

        let origin = timeline(&frame, 1);
        assert_eq!(origin.len(), 2);
        assert_eq!(origin[0].1, vec![3, 7]);
        assert!(close(origin[1].0, 0.02));
        assert!(origin[1].1.is_empty());

        let destination = timeline(&frame, 2);
        assert_eq!(destination.len(), 3);
        assert!(close(destination[1].0, 0.08));
        assert!(destination[1].1.is_empty());
        assert!(close(destination[2].0, 0.1));
        assert_eq!(destination[2].1, vec![3, 7]);
    }

    #[test]
    fn workers_matching_destination_type_settle() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 3, 20, 20)]),
            &ReplayConfig::default(),
        );
        let frame = acc
            .accumulate(info(0), quiet(vec![pod(1, 2, &[3, 7, 3], 0.0, 100.0)]))
            .unwrap();
        let destination = frame.building(id(2)).unwrap();
        assert_eq!(destination.settled_workers, 2);
        assert_eq!(destination.timeline.last().unwrap().workers.to_vec(), vec![7]);

        // Settled workers carry over, and are reset by a new month.
        let next = acc.accumulate(info(1), quiet(vec![])).unwrap();
        assert_eq!(next.building(id(2)).unwrap().settled_workers, 2);
        let month = FrameDelta {
            new_month: Some(NewMonth {
                score: 0,
                city: CityRecord::default(),
            }),
            month_end: None,
            events: vec![],
        };
        let reset = acc.accumulate(info(2), month).unwrap();
        assert_eq!(reset.building(id(2)).unwrap().settled_workers, 0);
    }

    #[test]
    fn new_month_appends_settle_checkpoint_when_workers_present() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 5, 20, 20)]),
            &ReplayConfig::default(),
        );
        acc.accumulate(info(0), quiet(vec![pod(1, 2, &[3], 0.0, 100.0)]))
            .unwrap();
        let month = FrameDelta {
            new_month: Some(NewMonth {
                score: 0,
                city: CityRecord {
                    buildings: vec![data(3, 1, 30, 30)],
                    resources: 7,
                },
            }),
            month_end: None,
            events: vec![],
        };
        let frame = acc.accumulate(FrameInfo::new(1, 500.0, 0.0), month).unwrap();
        assert_eq!(frame.city.resources, 7);
        assert_eq!(frame.city.buildings.len(), 3);

        let destination = timeline(&frame, 2);
        assert_eq!(destination, vec![(0.0, vec![3]), (0.2, vec![])]);
        // No workers, no settle checkpoint.
        assert_eq!(timeline(&frame, 1), vec![(0.0, vec![])]);
        assert_eq!(timeline(&frame, 3), vec![(0.0, vec![])]);
    }

    #[test]
    fn arrival_staggers_workers_over_the_shake() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 50, 50)]),
            &ReplayConfig::default(),
        );
        let arrival = ev(
            EventKind::ShuttleArrival {
                landing: id(1),
                counts: vec![2, 1],
            },
            0.0,
            1000.0,
        );
        let frame = acc.accumulate(info(0), quiet(vec![arrival])).unwrap();
        assert_eq!(frame.shuttle_params.len(), 1);
        let params = frame.shuttle_params[0];

        let checkpoints = timeline(&frame, 1);
        // p=0, shake start, then one checkpoint per worker.
        assert_eq!(checkpoints.len(), 5);
        assert!(close(checkpoints[1].0, params.fly_in_end));
        assert!(checkpoints[1].1.is_empty());
        assert_eq!(checkpoints[4].1, vec![1, 1, 2]);
        assert!(close(checkpoints[4].0, params.shake_out_workers_end));
    }

    #[test]
    fn teleports_are_split_and_applied() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 4, 90, 90)]),
            &ReplayConfig::deterministic(5),
        );
        let teleport = ev(
            EventKind::TeleporterTransport {
                from: id(1),
                to: id(2),
                payload: TeleportPayload::Grouped {
                    interval: 100.0,
                    unit_duration: 200.0,
                    counts: vec![(4, 1), (6, 2)],
                },
            },
            0.0,
            0.0,
        );
        let frame = acc.accumulate(info(0), quiet(vec![teleport])).unwrap();
        assert_eq!(frame.teleports().count(), 3);
        assert_eq!(frame.teleport_curves.len(), 3);

        let destination = frame.building(id(2)).unwrap();
        assert_eq!(destination.settled_workers, 1);
        let checkpoints = timeline(&frame, 2);
        // First activation freeze at 0.1 + 0.9 * 0.2 = 0.28 (the second worker's fade-in).
        assert!(checkpoints.iter().any(|(p, w)| close(*p, 0.28) && w.is_empty()));
        assert_eq!(checkpoints.last().unwrap().1, vec![6, 6]);
    }

    #[test]
    fn teleport_curves_are_reproducible() {
        let run = || {
            let mut acc = FrameAccumulator::new(
                &global(vec![data(1, 0, 10, 10), data(2, 4, 90, 90)]),
                &ReplayConfig::deterministic(77),
            );
            let teleport = ev(
                EventKind::TeleporterTransport {
                    from: id(1),
                    to: id(2),
                    payload: TeleportPayload::Single { worker: 1 },
                },
                0.0,
                100.0,
            );
            acc.accumulate(info(3), quiet(vec![teleport])).unwrap()
        };
        assert_eq!(run().teleport_curves, run().teleport_curves);
    }

    #[test]
    fn tubes_and_teleporters_persist() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 4, 90, 90)]),
            &ReplayConfig::default(),
        );
        let events = vec![
            ev(
                EventKind::UpgradeTube {
                    a: id(2),
                    b: id(1),
                    upgrades: 2,
                },
                0.0,
                10.0,
            ),
            ev(EventKind::BuildTube { a: id(1), b: id(2) }, 0.0, 10.0),
            ev(
                EventKind::NewTeleporter {
                    entrance: id(1),
                    exit: id(2),
                },
                0.0,
                10.0,
            ),
        ];
        acc.accumulate(info(0), quiet(events)).unwrap();
        let frame = acc.accumulate(info(1), quiet(vec![])).unwrap();

        assert_eq!(frame.tube(id(2), id(1)).unwrap().capacity, 3);
        assert_eq!(frame.city.teleporters.len(), 1);
        assert_eq!(acc.teleporters().len(), 1);
        let entrance = frame.building(id(1)).unwrap();
        let exit = frame.building(id(2)).unwrap();
        assert!(entrance.has_teleporter && entrance.is_teleporter_entrance);
        assert!(exit.has_teleporter && !exit.is_teleporter_entrance);
    }

    #[test]
    fn dangling_reference_is_reported_and_skipped() {
        let observer = Arc::new(CollectingObserver::new());
        let mut acc = FrameAccumulator::with_observer(
            &global(vec![data(1, 0, 10, 10)]),
            &ReplayConfig::default(),
            Some(observer.clone()),
        );
        let frame = acc
            .accumulate(info(4), quiet(vec![pod(1, 99, &[3], 0.0, 100.0)]))
            .unwrap();
        assert_eq!(timeline(&frame, 1).len(), 1);
        let violations = observer.violations_of_kind(ViolationKind::DanglingReference);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Critical);
        assert_eq!(violations[0].frame, Some(4));
    }

    #[test]
    fn dangling_reference_fails_when_strict_and_leaves_state_untouched() {
        let mut acc = FrameAccumulator::new(
            &global(vec![data(1, 0, 10, 10), data(2, 0, 10, 10)]),
            &ReplayConfig::strict(),
        );
        let events = vec![
            ev(
                EventKind::NewTeleporter {
                    entrance: id(1),
                    exit: id(2),
                },
                0.0,
                1.0,
            ),
            ev(
                EventKind::UpgradeTube {
                    a: id(1),
                    b: id(2),
                    upgrades: 1,
                },
                0.0,
                1.0,
            ),
        ];
        let err = acc.accumulate(info(0), quiet(events)).unwrap_err();
        assert_eq!(
            err,
            ReplayError::UnknownTube {
                key: TubeKey::new(id(1), id(2))
            }
        );
        assert!(acc.teleporters().is_empty());
        assert!(acc.latest().is_none());

        let err = acc
            .accumulate(info(0), quiet(vec![pod(1, 9, &[], 0.0, 1.0)]))
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::UnknownBuilding { context: "pod-transport", .. }
        ));
    }

    #[test]
    fn rejects_invalid_duration() {
        let mut acc = FrameAccumulator::new(&global(vec![]), &ReplayConfig::default());
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = acc
                .accumulate(FrameInfo::new(0, duration, 0.0), quiet(vec![]))
                .unwrap_err();
            assert!(matches!(err, ReplayError::InvalidFrameDuration { .. }));
        }
    }

    #[test]
    fn split_keeps_surrounding_order() {
        let marker = |b: i32| ev(EventKind::NewBuilding { building: id(b) }, 0.0, 1.0);
        let grouped = |n: u32| {
            ev(
                EventKind::TeleporterTransport {
                    from: id(1),
                    to: id(2),
                    payload: TeleportPayload::Grouped {
                        interval: 1.0,
                        unit_duration: 1.0,
                        counts: vec![(1, n)],
                    },
                },
                0.0,
                0.0,
            )
        };
        let split = split_teleport_events(vec![marker(10), grouped(2), marker(11), grouped(1)]);
        let kinds: Vec<_> = split.iter().map(|e| e.kind.params()).collect();
        assert_eq!(
            kinds,
            vec![
                vec![10],
                vec![1, 2, 1],
                vec![1, 2, 1],
                vec![1, 2, 1],
                vec![11],
            ]
        );
    }
}
