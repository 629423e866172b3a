//! Timed events carried by a frame delta.
//!
//! On the wire every event is `type start end param...` with a layout that depends on the type.
//! The decoder resolves that layout once into an [`EventKind`] variant; [`EventKind::params`]
//! gives back the positional view when a flat list is needed.

use crate::timeline::WorkerList;
use crate::{BuildingId, PodId, WorkerType};

/// Wire codes of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// A tube is built between two buildings.
    BuildTube = 0,
    /// A pod is put into service.
    BuildPod = 1,
    /// A pod carries workers from one building to another.
    PodTransport = 2,
    /// Workers are teleported from an entrance to an exit.
    TeleporterTransport = 3,
    /// A tube's capacity is raised.
    UpgradeTube = 4,
    /// A shuttle drops new workers at a landing building.
    ShuttleArrival = 5,
    /// A pod is taken out of service.
    DestroyPod = 6,
    /// A building appears.
    NewBuilding = 7,
    /// A teleporter is installed between two buildings.
    NewTeleporter = 8,
}

impl EventType {
    /// All event types, in wire-code order.
    pub const ALL: [Self; 9] = [
        Self::BuildTube,
        Self::BuildPod,
        Self::PodTransport,
        Self::TeleporterTransport,
        Self::UpgradeTube,
        Self::ShuttleArrival,
        Self::DestroyPod,
        Self::NewBuilding,
        Self::NewTeleporter,
    ];

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a wire code.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BuildTube => "build-tube",
            Self::BuildPod => "build-pod",
            Self::PodTransport => "pod-transport",
            Self::TeleporterTransport => "teleporter-transport",
            Self::UpgradeTube => "upgrade-tube",
            Self::ShuttleArrival => "shuttle-arrival",
            Self::DestroyPod => "destroy-pod",
            Self::NewBuilding => "new-building",
            Self::NewTeleporter => "new-teleporter",
        };
        f.write_str(name)
    }
}

/// Start and end of an event's animation.
///
/// Absolute time units as decoded; fractions of the frame once the accumulator has rescaled them.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct AnimWindow {
    /// Start of the window.
    pub start: f64,
    /// End of the window.
    pub end: f64,
}

impl AnimWindow {
    /// Creates a window.
    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The instant a fraction `t` of the way through the window.
    #[must_use]
    pub fn lerp(&self, t: f64) -> f64 {
        crate::animation::lerp(self.start, self.end, t)
    }

    /// Both bounds divided by `frame_duration`.
    #[must_use]
    pub fn rescaled(&self, frame_duration: f64) -> Self {
        Self {
            start: self.start / frame_duration,
            end: self.end / frame_duration,
        }
    }

    /// How far through this window the frame-local progress `q` is, clamped to `[0, 1]`.
    ///
    /// ```
    /// use selenia_replay::AnimWindow;
    ///
    /// let window = AnimWindow::new(0.2, 0.6);
    /// assert_eq!(window.progress_at(0.1), 0.0);
    /// assert!((window.progress_at(0.4) - 0.5).abs() < 1e-12);
    /// assert_eq!(window.progress_at(0.9), 1.0);
    /// ```
    #[must_use]
    pub fn progress_at(&self, q: f64) -> f64 {
        if self.end <= self.start {
            return if q >= self.end { 1.0 } else { 0.0 };
        }
        crate::animation::unlerp(self.start, self.end, q)
    }
}

/// What a teleporter transport carries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TeleportPayload {
    /// As decoded: one event per batch, staggered by `interval`.
    Grouped {
        /// Time between two consecutive departures.
        interval: f64,
        /// Time a single teleport takes.
        unit_duration: f64,
        /// `(worker type, count)` pairs in departure order.
        counts: Vec<(WorkerType, u32)>,
    },
    /// After splitting: exactly one worker.
    Single {
        /// The teleported worker's type.
        worker: WorkerType,
    },
}

impl TeleportPayload {
    /// Number of workers in this payload.
    #[must_use]
    pub fn worker_count(&self) -> u64 {
        match self {
            Self::Grouped { counts, .. } => counts.iter().map(|&(_, n)| u64::from(n)).sum(),
            Self::Single { .. } => 1,
        }
    }
}

/// Event payload, one shape per event type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    /// See [`EventType::BuildTube`].
    BuildTube {
        /// First endpoint.
        a: BuildingId,
        /// Second endpoint.
        b: BuildingId,
    },
    /// See [`EventType::BuildPod`]. Not interpreted.
    BuildPod {
        /// Raw wire params.
        params: Vec<i64>,
    },
    /// See [`EventType::PodTransport`].
    PodTransport {
        /// Origin building.
        from: BuildingId,
        /// Destination building.
        to: BuildingId,
        /// The pod.
        pod: PodId,
        /// Worker types on board, in boarding order.
        workers: WorkerList,
    },
    /// See [`EventType::TeleporterTransport`].
    TeleporterTransport {
        /// Entrance building.
        from: BuildingId,
        /// Exit building.
        to: BuildingId,
        /// Who is teleported.
        payload: TeleportPayload,
    },
    /// See [`EventType::UpgradeTube`].
    UpgradeTube {
        /// First endpoint.
        a: BuildingId,
        /// Second endpoint.
        b: BuildingId,
        /// Capacity added.
        upgrades: u32,
    },
    /// See [`EventType::ShuttleArrival`].
    ShuttleArrival {
        /// The landing building.
        landing: BuildingId,
        /// `counts[i]` is the number of arriving workers of type `i + 1`.
        counts: Vec<u32>,
    },
    /// See [`EventType::DestroyPod`]. Not interpreted.
    DestroyPod {
        /// Raw wire params.
        params: Vec<i64>,
    },
    /// See [`EventType::NewBuilding`].
    NewBuilding {
        /// The new building.
        building: BuildingId,
    },
    /// See [`EventType::NewTeleporter`].
    NewTeleporter {
        /// Entrance building.
        entrance: BuildingId,
        /// Exit building.
        exit: BuildingId,
    },
    /// Stand-in for a back-reference that could not be resolved. Has no effect.
    Placeholder,
}

impl EventKind {
    /// The wire type, or `None` for [`EventKind::Placeholder`].
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        Some(match self {
            Self::BuildTube { .. } => EventType::BuildTube,
            Self::BuildPod { .. } => EventType::BuildPod,
            Self::PodTransport { .. } => EventType::PodTransport,
            Self::TeleporterTransport { .. } => EventType::TeleporterTransport,
            Self::UpgradeTube { .. } => EventType::UpgradeTube,
            Self::ShuttleArrival { .. } => EventType::ShuttleArrival,
            Self::DestroyPod { .. } => EventType::DestroyPod,
            Self::NewBuilding { .. } => EventType::NewBuilding,
            Self::NewTeleporter { .. } => EventType::NewTeleporter,
            Self::Placeholder => return None,
        })
    }

    /// The positional parameter list, as it would appear on the wire with pod passengers
    /// unpacked.
    ///
    /// ```
    /// use selenia_replay::{BuildingId, EventKind, PodId};
    ///
    /// let kind = EventKind::PodTransport {
    ///     from: BuildingId::new(1),
    ///     to: BuildingId::new(99),
    ///     pod: PodId::new(42),
    ///     workers: [3, 7].into_iter().collect(),
    /// };
    /// assert_eq!(kind.params(), vec![1, 99, 42, 3, 7]);
    /// ```
    #[must_use]
    pub fn params(&self) -> Vec<i64> {
        let id = |b: &BuildingId| i64::from(b.as_i32());
        match self {
            Self::BuildTube { a, b } => vec![id(a), id(b)],
            Self::BuildPod { params } | Self::DestroyPod { params } => params.clone(),
            Self::PodTransport {
                from,
                to,
                pod,
                workers,
            } => [id(from), id(to), i64::from(pod.as_i32())]
                .into_iter()
                .chain(workers.iter().map(|&w| i64::from(w)))
                .collect(),
            Self::TeleporterTransport { from, to, payload } => match payload {
                TeleportPayload::Grouped {
                    interval,
                    unit_duration,
                    counts,
                } => [id(from), id(to), *interval as i64, *unit_duration as i64]
                    .into_iter()
                    .chain(
                        counts
                            .iter()
                            .flat_map(|&(w, n)| [i64::from(w), i64::from(n)]),
                    )
                    .collect(),
                TeleportPayload::Single { worker } => vec![id(from), id(to), i64::from(*worker)],
            },
            Self::UpgradeTube { a, b, upgrades } => vec![id(a), id(b), i64::from(*upgrades)],
            Self::ShuttleArrival { landing, counts } => std::iter::once(id(landing))
                .chain(counts.iter().map(|&n| i64::from(n)))
                .collect(),
            Self::NewBuilding { building } => vec![id(building)],
            Self::NewTeleporter { entrance, exit } => vec![id(entrance), id(exit)],
            Self::Placeholder => Vec::new(),
        }
    }
}

/// A decoded event: what happens, and when.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    /// The event payload.
    pub kind: EventKind,
    /// When it happens.
    pub window: AnimWindow,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub const fn new(kind: EventKind, window: AnimWindow) -> Self {
        Self { kind, window }
    }

    /// An event with no effect, used where a back-reference could not be resolved.
    #[must_use]
    pub const fn placeholder() -> Self {
        Self {
            kind: EventKind::Placeholder,
            window: AnimWindow::new(0.0, 0.0),
        }
    }

    /// Shorthand for `self.kind.event_type()`.
    #[must_use]
    pub const fn event_type(&self) -> Option<EventType> {
        self.kind.event_type()
    }

    /// Returns true for [`EventKind::Placeholder`].
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self.kind, EventKind::Placeholder)
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

    #[test]
    fn wire_codes() {
        for (code, ty) in EventType::ALL.iter().enumerate() {
            assert_eq!(usize::from(ty.code()), code);
            assert_eq!(EventType::from_code(code as i64), Some(*ty));
        }
        assert_eq!(EventType::from_code(9), None);
        assert_eq!(EventType::from_code(-1), None);
    }

    #[test]
    fn grouped_teleport_params_are_positional() {
        let kind = EventKind::TeleporterTransport {
            from: BuildingId::new(4),
            to: BuildingId::new(5),
            payload: TeleportPayload::Grouped {
                interval: 10.0,
                unit_duration: 300.0,
                counts: vec![(1, 2), (3, 3)],
            },
        };
        assert_eq!(kind.params(), vec![4, 5, 10, 300, 1, 2, 3, 3]);
        assert_eq!(kind.event_type(), Some(EventType::TeleporterTransport));
    }

    #[test]
    fn arrival_params_start_with_landing() {
        let kind = EventKind::ShuttleArrival {
            landing: BuildingId::new(0),
            counts: vec![2, 0, 1],
        };
        assert_eq!(kind.params(), vec![0, 2, 0, 1]);
    }

    #[test]
    fn placeholder_has_no_type_or_params() {
        let event = Event::placeholder();
        assert!(event.is_placeholder());
        assert_eq!(event.event_type(), None);
        assert!(event.kind.params().is_empty());
    }

    #[test]
    fn window_rescale_and_progress() {
        let window = AnimWindow::new(100.0, 300.0).rescaled(1000.0);
        assert!((window.start - 0.1).abs() < 1e-12);
        assert!((window.end - 0.3).abs() < 1e-12);
        assert!((window.lerp(0.5) - 0.2).abs() < 1e-12);
        assert!((window.progress_at(0.2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_length_window_is_a_step() {
        let window = AnimWindow::new(0.5, 0.5);
        assert_eq!(window.progress_at(0.49), 0.0);
        assert_eq!(window.progress_at(0.5), 1.0);
    }

    #[test]
    fn payload_worker_count() {
        let grouped = TeleportPayload::Grouped {
            interval: 1.0,
            unit_duration: 1.0,
            counts: vec![(1, 2), (2, 3)],
        };
        assert_eq!(grouped.worker_count(), 5);
        assert_eq!(TeleportPayload::Single { worker: 4 }.worker_count(), 1);
    }
}
