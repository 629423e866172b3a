//! Plaintext record decoding.
//!
//! Three record shapes travel on the wire, all newline-delimited:
//!
//! ```text
//! global:  minX / minY / maxX / maxY / simplified(0|1) / gameRatio / <city>
//! city:    buildingCount / (id type x y)* / resources
//! frame:   isNewMonth / isMonthEnd / [score / <city>] / [score / resources]
//!          / eventCount / event line*
//! ```
//!
//! A city record is read as a stream of whitespace-separated tokens that may span lines, and
//! must end on a line boundary; the one-line form `2 1 0 10 10 2 3 40 50 300` and the
//! one-building-per-line form decode identically.
//!
//! An event line is either `type start end param...` or a lone integer referring back to the
//! [`EventCache`].

use std::str::SplitWhitespace;
use std::sync::Arc;

use crate::city::BuildingData;
use crate::codec::base91::{decode_worker_list, Base91Error};
use crate::codec::event_cache::EventCache;
use crate::config::{CachePolicy, FaultPolicy, ReplayConfig};
use crate::error::{MalformedReason, ReplayError};
use crate::event::{AnimWindow, Event, EventKind, EventType, TeleportPayload};
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{BuildingId, PodId, WorkerType};

/// Highest worker (and building) type code plus one.
const WORKER_TYPE_LIMIT: i64 = 100;

/// A city as sent on the wire: the buildings it introduces and the current resources.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CityRecord {
    /// Buildings, in wire order.
    pub buildings: Vec<BuildingData>,
    /// Resources.
    pub resources: i64,
}

/// The session header.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlobalData {
    /// Left edge of the map.
    pub min_x: f64,
    /// Top edge of the map.
    pub min_y: f64,
    /// Right edge of the map.
    pub max_x: f64,
    /// Bottom edge of the map.
    pub max_y: f64,
    /// The viewer should skip worker animations.
    pub simplified: bool,
    /// Fixed map-to-pixel ratio; zero or negative means auto-fit.
    pub game_ratio: f64,
    /// The starting city.
    pub city: CityRecord,
}

/// Fields present when a frame opens a new month.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewMonth {
    /// Score at the start of the month.
    pub score: i64,
    /// New buildings and resources.
    pub city: CityRecord,
}

/// Fields present on the last frame of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MonthEnd {
    /// Score after the month's payout.
    pub score: i64,
    /// Resources after the month's payout.
    pub resources: i64,
}

/// One decoded turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameDelta {
    /// Set if this frame starts a new month.
    pub new_month: Option<NewMonth>,
    /// Set if this frame ends a month.
    pub month_end: Option<MonthEnd>,
    /// Events in wire order, back-references resolved.
    pub events: Vec<Event>,
}

impl FrameDelta {
    /// Returns true if this frame starts a new month.
    #[must_use]
    pub const fn is_new_month(&self) -> bool {
        self.new_month.is_some()
    }

    /// Returns true if this frame ends a month.
    #[must_use]
    pub const fn is_month_end(&self) -> bool {
        self.month_end.is_some()
    }

    /// The score carried by this frame. The month-end score wins when both are present.
    #[must_use]
    pub fn score(&self) -> Option<i64> {
        self.month_end
            .map(|end| end.score)
            .or_else(|| self.new_month.as_ref().map(|start| start.score))
    }

    /// The resources carried by this frame. The month-end value wins when both are present.
    #[must_use]
    pub fn resources(&self) -> Option<i64> {
        self.month_end
            .map(|end| end.resources)
            .or_else(|| self.new_month.as_ref().map(|start| start.city.resources))
    }

    /// Buildings introduced by this frame.
    #[must_use]
    pub fn new_buildings(&self) -> &[BuildingData] {
        self.new_month
            .as_ref()
            .map_or(&[], |start| start.city.buildings.as_slice())
    }
}

/// Decoder settings and reporting target for one frame.
#[derive(Clone, Default)]
pub struct DecodeContext {
    /// Which events are recorded in the cache.
    pub cache_policy: CachePolicy,
    /// What an unresolvable back-reference does.
    pub cache_miss: FaultPolicy,
    /// Where soft faults are reported. Falls back to `tracing` when `None`.
    pub observer: Option<Arc<dyn ViolationObserver>>,
    /// Frame being decoded, attached to reports.
    pub frame: Option<u32>,
}

impl std::fmt::Debug for DecodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("cache_policy", &self.cache_policy)
            .field("cache_miss", &self.cache_miss)
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .field("frame", &self.frame)
            .finish()
    }
}

impl DecodeContext {
    /// Takes the decoder settings from a session configuration.
    #[must_use]
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self {
            cache_policy: config.cache_policy,
            cache_miss: config.cache_miss,
            observer: None,
            frame: None,
        }
    }

    /// Sets the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the frame number attached to reports.
    #[must_use]
    pub const fn with_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }

    fn caches(&self, event_type: EventType) -> bool {
        match self.cache_policy {
            CachePolicy::PodTransportOnly => event_type == EventType::PodTransport,
            CachePolicy::EveryDecodedEvent => true,
        }
    }
}

#[inline]
const fn malformed(line: usize, reason: MalformedReason) -> ReplayError {
    ReplayError::MalformedPayload { line, reason }
}

fn parse_int<T: TryFrom<i64>>(line: usize, token: &str, field: &'static str) -> Result<T, ReplayError> {
    let value: i64 = token.parse().map_err(|_| {
        malformed(
            line,
            MalformedReason::NotANumber {
                field,
                token: token.to_string(),
            },
        )
    })?;
    T::try_from(value).map_err(|_| malformed(line, MalformedReason::OutOfRange { field, value }))
}

fn parse_float(line: usize, token: &str, field: &'static str) -> Result<f64, ReplayError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            malformed(
                line,
                MalformedReason::NotANumber {
                    field,
                    token: token.to_string(),
                },
            )
        })
}

fn parse_worker(line: usize, token: &str, field: &'static str) -> Result<WorkerType, ReplayError> {
    let value: i64 = parse_int(line, token, field)?;
    if !(0..WORKER_TYPE_LIMIT).contains(&value) {
        return Err(malformed(line, MalformedReason::OutOfRange { field, value }));
    }
    WorkerType::try_from(value).map_err(|_| malformed(line, MalformedReason::OutOfRange { field, value }))
}

/// Line cursor over a plaintext record.
struct Lines<'a> {
    lines: Vec<&'a str>,
    next: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            next: 0,
        }
    }

    fn next_line(&mut self, field: &'static str) -> Result<(usize, &'a str), ReplayError> {
        let line = self.next;
        let text = self
            .lines
            .get(line)
            .copied()
            .ok_or(malformed(line, MalformedReason::MissingField { field }))?;
        self.next += 1;
        Ok((line, text))
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, ReplayError> {
        self.next_line(field).map(|(_, text)| text.trim() == "1")
    }

    fn value_token(&mut self, field: &'static str) -> Result<(usize, &'a str), ReplayError> {
        let (line, text) = self.next_line(field)?;
        let token = text.trim();
        if token.is_empty() {
            return Err(malformed(line, MalformedReason::MissingField { field }));
        }
        Ok((line, token))
    }

    fn int<T: TryFrom<i64>>(&mut self, field: &'static str) -> Result<T, ReplayError> {
        let (line, token) = self.value_token(field)?;
        parse_int(line, token, field)
    }

    fn float(&mut self, field: &'static str) -> Result<f64, ReplayError> {
        let (line, token) = self.value_token(field)?;
        parse_float(line, token, field)
    }

    fn city(&mut self) -> Result<CityRecord, ReplayError> {
        let mut tokens = Tokens {
            lines: self,
            current: None,
        };
        let count: usize = tokens.int("building count")?;
        let mut buildings = Vec::new();
        for _ in 0..count {
            let id = BuildingId::new(tokens.int("building id")?);
            let (line, token) = tokens.next("building type")?;
            let building_type = parse_worker(line, token, "building type")?;
            let x = tokens.int("building x")?;
            let y = tokens.int("building y")?;
            buildings.push(BuildingData {
                id,
                building_type,
                x,
                y,
            });
        }
        let resources = tokens.int("resources")?;
        tokens.finish("city")?;
        Ok(CityRecord {
            buildings,
            resources,
        })
    }
}

/// Whitespace tokens spanning lines, for city records.
struct Tokens<'l, 'a> {
    lines: &'l mut Lines<'a>,
    current: Option<(usize, SplitWhitespace<'a>)>,
}

impl<'a> Tokens<'_, 'a> {
    fn next(&mut self, field: &'static str) -> Result<(usize, &'a str), ReplayError> {
        loop {
            if let Some((line, tokens)) = &mut self.current {
                if let Some(token) = tokens.next() {
                    return Ok((*line, token));
                }
            }
            let (line, text) = self.lines.next_line(field)?;
            self.current = Some((line, text.split_whitespace()));
        }
    }

    fn int<T: TryFrom<i64>>(&mut self, field: &'static str) -> Result<T, ReplayError> {
        let (line, token) = self.next(field)?;
        parse_int(line, token, field)
    }

    fn finish(self, record: &'static str) -> Result<(), ReplayError> {
        if let Some((line, tokens)) = self.current {
            let count = tokens.count();
            if count > 0 {
                return Err(malformed(line, MalformedReason::TrailingTokens { record, count }));
            }
        }
        Ok(())
    }
}

/// Positional parameters of one event line.
struct Params<'s, 'a> {
    line: usize,
    tokens: std::slice::Iter<'s, &'a str>,
}

impl<'a> Params<'_, 'a> {
    fn token(&mut self, field: &'static str) -> Result<&'a str, ReplayError> {
        self.tokens
            .next()
            .copied()
            .ok_or(malformed(self.line, MalformedReason::MissingField { field }))
    }

    fn int<T: TryFrom<i64>>(&mut self, field: &'static str) -> Result<T, ReplayError> {
        let token = self.token(field)?;
        parse_int(self.line, token, field)
    }

    fn building(&mut self, field: &'static str) -> Result<BuildingId, ReplayError> {
        self.int(field).map(BuildingId::new)
    }

    fn worker(&mut self, field: &'static str) -> Result<WorkerType, ReplayError> {
        let token = self.token(field)?;
        parse_worker(self.line, token, field)
    }

    fn is_empty(&self) -> bool {
        self.tokens.len() == 0
    }

    fn rest<T: TryFrom<i64>>(&mut self, field: &'static str) -> Result<Vec<T>, ReplayError> {
        let line = self.line;
        self.tokens
            .by_ref()
            .map(|token| parse_int(line, token, field))
            .collect()
    }

    fn finish(self, record: &'static str) -> Result<(), ReplayError> {
        let count = self.tokens.len();
        if count > 0 {
            return Err(malformed(self.line, MalformedReason::TrailingTokens { record, count }));
        }
        Ok(())
    }
}

fn decode_kind(event_type: EventType, mut params: Params<'_, '_>) -> Result<EventKind, ReplayError> {
    let kind = match event_type {
        EventType::BuildTube => EventKind::BuildTube {
            a: params.building("tube endpoint")?,
            b: params.building("tube endpoint")?,
        },
        EventType::BuildPod => EventKind::BuildPod {
            params: params.rest("pod param")?,
        },
        EventType::DestroyPod => EventKind::DestroyPod {
            params: params.rest("pod param")?,
        },
        EventType::PodTransport => {
            let from = params.building("pod origin")?;
            let to = params.building("pod destination")?;
            let pod = PodId::new(params.int("pod id")?);
            let workers = match params.tokens.next() {
                Some(packed) => decode_worker_list(packed)
                    .map_err(|err| match err {
                        Base91Error::InvalidDigit { character, .. } => {
                            malformed(params.line, MalformedReason::InvalidBase91 { character })
                        },
                        Base91Error::PairOutOfRange { value } => malformed(
                            params.line,
                            MalformedReason::OutOfRange {
                                field: "pod passengers",
                                value: i64::from(value),
                            },
                        ),
                    })?
                    .into_iter()
                    .collect(),
                None => Default::default(),
            };
            EventKind::PodTransport {
                from,
                to,
                pod,
                workers,
            }
        },
        EventType::TeleporterTransport => {
            let from = params.building("teleport entrance")?;
            let to = params.building("teleport exit")?;
            let interval = params.int::<i64>("teleport interval")? as f64;
            let unit_duration = params.int::<i64>("teleport duration")? as f64;
            let mut counts = Vec::new();
            while !params.is_empty() {
                let worker = params.worker("teleport worker type")?;
                let count = params.int("teleport worker count")?;
                counts.push((worker, count));
            }
            EventKind::TeleporterTransport {
                from,
                to,
                payload: TeleportPayload::Grouped {
                    interval,
                    unit_duration,
                    counts,
                },
            }
        },
        EventType::UpgradeTube => EventKind::UpgradeTube {
            a: params.building("tube endpoint")?,
            b: params.building("tube endpoint")?,
            upgrades: params.int("tube upgrades")?,
        },
        EventType::ShuttleArrival => {
            let landing = params.building("landing building")?;
            let counts: Vec<u32> = params.rest("arrival count")?;
            // counts[i] is for worker type i + 1
            if counts.len() as i64 >= WORKER_TYPE_LIMIT {
                return Err(malformed(
                    params.line,
                    MalformedReason::OutOfRange {
                        field: "arrival worker type",
                        value: counts.len() as i64,
                    },
                ));
            }
            EventKind::ShuttleArrival { landing, counts }
        },
        EventType::NewBuilding => EventKind::NewBuilding {
            building: params.building("building id")?,
        },
        EventType::NewTeleporter => EventKind::NewTeleporter {
            entrance: params.building("teleporter entrance")?,
            exit: params.building("teleporter exit")?,
        },
    };
    params.finish("event")?;
    Ok(kind)
}

fn resolve_back_reference(
    line: usize,
    token: &str,
    cache: &EventCache,
    ctx: &DecodeContext,
) -> Result<Event, ReplayError> {
    let index: i64 = parse_int(line, token, "cache index")?;
    if let Some(event) = usize::try_from(index).ok().and_then(|i| cache.get(i)) {
        return Ok(event.clone());
    }
    if ctx.cache_miss.is_fail() {
        return Err(ReplayError::CacheMiss {
            index,
            len: cache.len(),
        });
    }
    report_violation_to!(
        ctx.observer,
        ctx.frame,
        ViolationSeverity::Warning,
        ViolationKind::EventCache,
        "event cache back-reference {} out of range at line {} (cache holds {} events)",
        index,
        line,
        cache.len()
    );
    Ok(Event::placeholder())
}

fn decode_event_line(
    line: usize,
    text: &str,
    cache: &mut EventCache,
    ctx: &DecodeContext,
) -> Result<Event, ReplayError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(malformed(line, MalformedReason::MissingField { field: "event type" })),
        [index] => resolve_back_reference(line, index, cache, ctx),
        [_, _] => Err(malformed(line, MalformedReason::MissingField { field: "event end" })),
        [code, start, end, rest @ ..] => {
            let code: i64 = parse_int(line, code, "event type")?;
            let event_type = EventType::from_code(code)
                .ok_or(malformed(line, MalformedReason::UnknownEventType { code }))?;
            let window = AnimWindow::new(
                parse_float(line, start, "event start")?,
                parse_float(line, end, "event end")?,
            );
            let kind = decode_kind(
                event_type,
                Params {
                    line,
                    tokens: rest.iter(),
                },
            )?;
            let event = Event::new(kind, window);

            if ctx.caches(event_type) && !cache.record(&event) && cache.rejected() == 1 {
                report_violation_to!(
                    ctx.observer,
                    ctx.frame,
                    ViolationSeverity::Warning,
                    ViolationKind::EventCache,
                    "event cache reached its capacity of {}; later events are not recorded",
                    cache.capacity()
                );
            }
            Ok(event)
        },
    }
}

/// Decodes a standalone city record.
///
/// # Errors
///
/// Returns [`ReplayError::MalformedPayload`] if a field is missing or not a number.
pub fn parse_city(text: &str) -> Result<CityRecord, ReplayError> {
    Lines::new(text).city()
}

/// Decodes the session header.
///
/// # Errors
///
/// Returns [`ReplayError::MalformedPayload`] if a field is missing or not a number.
pub fn parse_global(text: &str) -> Result<GlobalData, ReplayError> {
    let mut lines = Lines::new(text);
    let min_x = lines.float("minX")?;
    let min_y = lines.float("minY")?;
    let max_x = lines.float("maxX")?;
    let max_y = lines.float("maxY")?;
    let simplified = lines.flag("simplified mode")?;
    let game_ratio = lines.float("game ratio")?;
    let city = lines.city()?;
    Ok(GlobalData {
        min_x,
        min_y,
        max_x,
        max_y,
        simplified,
        game_ratio,
        city,
    })
}

/// Decodes one frame, resolving back-references through `cache` and recording new events in it.
///
/// Nothing is returned for a record that fails to decode, but events decoded before the
/// failing line stay recorded in the cache, as they would on the server side.
///
/// # Errors
///
/// Returns [`ReplayError::MalformedPayload`] if a field is missing or not a number, and
/// [`ReplayError::CacheMiss`] for an unresolvable back-reference when `ctx.cache_miss` is
/// [`FaultPolicy::Fail`].
pub fn parse_frame_delta(
    text: &str,
    cache: &mut EventCache,
    ctx: &DecodeContext,
) -> Result<FrameDelta, ReplayError> {
    let mut lines = Lines::new(text);
    let is_new_month = lines.flag("new month flag")?;
    let is_month_end = lines.flag("month end flag")?;

    let new_month = if is_new_month {
        Some(NewMonth {
            score: lines.int("new month score")?,
            city: lines.city()?,
        })
    } else {
        None
    };
    let month_end = if is_month_end {
        Some(MonthEnd {
            score: lines.int("month end score")?,
            resources: lines.int("month end resources")?,
        })
    } else {
        None
    };

    let count: usize = lines.int("event count")?;
    let mut events = Vec::new();
    for _ in 0..count {
        let (line, text) = lines.next_line("event")?;
        events.push(decode_event_line(line, text, cache, ctx)?);
    }

    tracing::trace!(
        frame = ?ctx.frame,
        new_month = is_new_month,
        month_end = is_month_end,
        events = events.len(),
        cache_len = cache.len(),
        "decoded frame delta"
    );

    Ok(FrameDelta {
        new_month,
        month_end,
        events,
    })
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
    use crate::codec::base91::encode_base91;
    use crate::telemetry::CollectingObserver;

    fn decode(text: &str, cache: &mut EventCache) -> Result<FrameDelta, ReplayError> {
        parse_frame_delta(text, cache, &DecodeContext::default())
    }

    #[test]
    fn global_record_with_one_building_per_line() {
        let global = parse_global("0\n0\n100\n100\n0\n-1\n1\n1 0 10 10\n0").unwrap();
        assert_eq!(global.max_x, 100.0);
        assert!(!global.simplified);
        assert_eq!(global.game_ratio, -1.0);
        assert_eq!(
            global.city.buildings,
            vec![BuildingData {
                id: BuildingId::new(1),
                building_type: 0,
                x: 10,
                y: 10
            }]
        );
        assert_eq!(global.city.resources, 0);
    }

    #[test]
    fn city_record_layouts_are_equivalent() {
        let one_line = parse_city("2 1 0 10 10 2 3 40 50 300").unwrap();
        let per_line = parse_city("2\n1 0 10 10\n2 3 40 50\n300").unwrap();
        assert_eq!(one_line, per_line);
        assert_eq!(one_line.buildings.len(), 2);
        assert_eq!(one_line.resources, 300);
    }

    #[test]
    fn city_record_must_end_on_a_line_boundary() {
        let err = parse_city("1\n1 0 10 10\n5 7").unwrap_err();
        assert_eq!(
            err,
            ReplayError::MalformedPayload {
                line: 2,
                reason: MalformedReason::TrailingTokens {
                    record: "city",
                    count: 1
                }
            }
        );
    }

    #[test]
    fn quiet_frame() {
        let delta = decode("0\n0\n0", &mut EventCache::new()).unwrap();
        assert!(!delta.is_new_month());
        assert!(!delta.is_month_end());
        assert!(delta.events.is_empty());
        assert_eq!(delta.score(), None);
        assert_eq!(delta.resources(), None);
    }

    #[test]
    fn new_month_and_month_end_fields_in_fixed_order() {
        let text = "1\n1\n50\n1 4 2 5 5\n120\n75\n90\n0";
        let delta = decode(text, &mut EventCache::new()).unwrap();
        let new_month = delta.new_month.as_ref().unwrap();
        assert_eq!(new_month.score, 50);
        assert_eq!(new_month.city.resources, 120);
        assert_eq!(delta.new_buildings()[0].id, BuildingId::new(4));
        assert_eq!(delta.month_end, Some(MonthEnd { score: 75, resources: 90 }));
        assert_eq!(delta.score(), Some(75));
        assert_eq!(delta.resources(), Some(90));
    }

    #[test]
    fn pod_transport_unpacks_passengers_and_is_cached() {
        let packed = encode_base91(&[3, 7]).unwrap();
        let text = format!("0\n0\n2\n2 0 100 1 99 42 {packed}\n0");
        let mut cache = EventCache::new();
        let delta = decode(&text, &mut cache).unwrap();
        assert_eq!(delta.events.len(), 2);
        assert_eq!(delta.events[0].kind.params(), vec![1, 99, 42, 3, 7]);
        assert_eq!(delta.events[0].window, AnimWindow::new(0.0, 100.0));
        assert_eq!(delta.events[1], delta.events[0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn pod_transport_without_passengers() {
        let delta = decode("0\n0\n1\n2 0 10 1 2 3", &mut EventCache::new()).unwrap();
        match &delta.events[0].kind {
            EventKind::PodTransport { workers, .. } => assert!(workers.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_pod_transports_are_cached_by_default() {
        let mut cache = EventCache::new();
        decode("0\n0\n2\n0 0 10 1 2\n7 0 10 5", &mut cache).unwrap();
        assert!(cache.is_empty());

        let ctx = DecodeContext {
            cache_policy: CachePolicy::EveryDecodedEvent,
            ..DecodeContext::default()
        };
        parse_frame_delta("0\n0\n2\n0 0 10 1 2\n7 0 10 5", &mut cache, &ctx).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn teleport_pairs_are_grouped() {
        let delta = decode("0\n0\n1\n3 0 500 4 5 10 300 1 2 3 3", &mut EventCache::new()).unwrap();
        assert_eq!(
            delta.events[0].kind,
            EventKind::TeleporterTransport {
                from: BuildingId::new(4),
                to: BuildingId::new(5),
                payload: TeleportPayload::Grouped {
                    interval: 10.0,
                    unit_duration: 300.0,
                    counts: vec![(1, 2), (3, 3)],
                },
            }
        );
    }

    #[test]
    fn teleport_pair_without_count_is_malformed() {
        let err = decode("0\n0\n1\n3 0 500 4 5 10 300 1", &mut EventCache::new()).unwrap_err();
        assert_eq!(
            err,
            ReplayError::MalformedPayload {
                line: 3,
                reason: MalformedReason::MissingField {
                    field: "teleport worker count"
                }
            }
        );
    }

    #[test]
    fn arrival_upgrade_and_structure_events() {
        let text = "0\n0\n4\n5 0 10 0 2 0 1\n4 0 10 3 9 2\n8 0 10 1 2\n1 0 10 6 7 8";
        let delta = decode(text, &mut EventCache::new()).unwrap();
        assert_eq!(
            delta.events[0].kind,
            EventKind::ShuttleArrival {
                landing: BuildingId::new(0),
                counts: vec![2, 0, 1]
            }
        );
        assert_eq!(
            delta.events[1].kind,
            EventKind::UpgradeTube {
                a: BuildingId::new(3),
                b: BuildingId::new(9),
                upgrades: 2
            }
        );
        assert_eq!(
            delta.events[2].kind,
            EventKind::NewTeleporter {
                entrance: BuildingId::new(1),
                exit: BuildingId::new(2)
            }
        );
        assert_eq!(delta.events[3].kind, EventKind::BuildPod { params: vec![6, 7, 8] });
    }

    #[test]
    fn out_of_range_back_reference_is_replaced_by_placeholder() {
        let observer = Arc::new(CollectingObserver::new());
        let ctx = DecodeContext::default()
            .with_observer(Some(observer.clone()))
            .with_frame(3);
        let delta = parse_frame_delta("0\n0\n2\n5\n7 0 10 1", &mut EventCache::new(), &ctx).unwrap();
        assert!(delta.events[0].is_placeholder());
        assert_eq!(delta.events[1].event_type(), Some(EventType::NewBuilding));

        let violations = observer.violations_of_kind(ViolationKind::EventCache);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Warning);
        assert_eq!(violations[0].frame, Some(3));
    }

    #[test]
    fn out_of_range_back_reference_fails_when_strict() {
        let ctx = DecodeContext {
            cache_miss: FaultPolicy::Fail,
            ..DecodeContext::default()
        };
        let err = parse_frame_delta("0\n0\n1\n-1", &mut EventCache::new(), &ctx).unwrap_err();
        assert_eq!(err, ReplayError::CacheMiss { index: -1, len: 0 });
    }

    #[test]
    fn cache_full_is_reported_once() {
        let observer = Arc::new(CollectingObserver::new());
        let ctx = DecodeContext::default().with_observer(Some(observer.clone()));
        let mut cache = EventCache::with_capacity(1);
        parse_frame_delta("0\n0\n3\n2 0 1 1 2 3\n2 0 1 1 2 4\n2 0 1 1 2 5", &mut cache, &ctx).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.rejected(), 2);
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn structural_failures() {
        let mut cache = EventCache::new();
        let cases: [(&str, MalformedReason); 6] = [
            ("0", MalformedReason::MissingField { field: "month end flag" }),
            ("0\n0\nx", MalformedReason::NotANumber { field: "event count", token: "x".into() }),
            ("0\n0\n1\n42 0 10", MalformedReason::UnknownEventType { code: 42 }),
            ("0\n0\n1\n7 0", MalformedReason::MissingField { field: "event end" }),
            ("0\n0\n1\n2 0 10 1 2 3 3S'", MalformedReason::InvalidBase91 { character: '\'' }),
            ("0\n0\n1\n0 0 10 1 2 3", MalformedReason::TrailingTokens { record: "event", count: 1 }),
        ];
        for (text, reason) in cases {
            match decode(text, &mut cache) {
                Err(ReplayError::MalformedPayload { reason: got, .. }) => assert_eq!(got, reason, "{text:?}"),
                other => panic!("{text:?}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn non_finite_times_are_rejected() {
        let err = decode("0\n0\n1\n7 NaN 10 1", &mut EventCache::new()).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MalformedPayload {
                reason: MalformedReason::NotANumber { field: "event start", .. },
                ..
            }
        ));
    }

    #[test]
    fn fewer_event_lines_than_announced() {
        let err = decode("0\n0\n2\n7 0 10 1", &mut EventCache::new()).unwrap_err();
        assert_eq!(
            err,
            ReplayError::MalformedPayload {
                line: 4,
                reason: MalformedReason::MissingField { field: "event" }
            }
        );
    }

    #[test]
    fn worker_types_must_be_two_digit_codes() {
        let err = parse_city("1 1 100 0 0 0").unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MalformedPayload {
                reason: MalformedReason::OutOfRange { field: "building type", value: 100 },
                ..
            }
        ));
    }
}
