//! Reconstructed frames.

use std::sync::Arc;

use crate::animation::{ShuttleParams, TeleportCurve};
use crate::city::{Building, City, Tube};
use crate::event::{Event, EventType};
use crate::BuildingId;

/// Host-supplied metadata of one turn.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameInfo {
    /// Turn sequence number. Strictly increasing within a session.
    pub number: u32,
    /// Length of the turn in wire time units. Event times are divided by it.
    pub duration: f64,
    /// Host timestamp of the turn.
    pub timestamp: f64,
}

impl FrameInfo {
    /// Creates frame metadata.
    #[must_use]
    pub const fn new(number: u32, duration: f64, timestamp: f64) -> Self {
        Self {
            number,
            duration,
            timestamp,
        }
    }
}

/// The world after a turn, ready to be rendered at any progress in `[0, 1]`.
///
/// Frames are immutable once produced. Each keeps a link to the frame it was built on; the
/// first frame of a session is its own predecessor.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct CumulativeFrame {
    /// Host metadata.
    pub info: FrameInfo,
    /// This turn opened a new month.
    pub is_new_month: bool,
    /// This turn closed a month.
    pub is_month_end: bool,
    /// Day of the month, starting at 1.
    pub day: u32,
    /// Months elapsed, starting at 1 with the first new month.
    pub month: u32,
    /// Current score.
    pub score: i64,
    /// Buildings with their timelines, tubes, teleporters and resources.
    pub city: City,
    /// Events with frame-local windows; teleports split to one worker each.
    pub events: Vec<Event>,
    /// One curve per teleport event, in event order.
    pub teleport_curves: Vec<TeleportCurve>,
    /// One set of phases per shuttle arrival, in event order.
    pub shuttle_params: Vec<ShuttleParams>,
    #[serde(skip)]
    pub(crate) previous: Option<Arc<CumulativeFrame>>,
}

impl CumulativeFrame {
    /// The frame this one was built on, or `self` for the first frame of a session.
    #[must_use]
    pub fn previous(&self) -> &Self {
        self.previous.as_deref().unwrap_or(self)
    }

    /// Returns true if this frame was built on another one.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Looks a building up by id.
    #[must_use]
    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.city.building(id)
    }

    /// Looks a tube up by its endpoints, in either order.
    #[must_use]
    pub fn tube(&self, a: BuildingId, b: BuildingId) -> Option<&Tube> {
        self.city.tube(a, b)
    }

    /// Events of one type, in order.
    pub fn events_of(&self, event_type: EventType) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter(move |e| e.event_type() == Some(event_type))
    }

    /// Teleport events paired with their curves.
    pub fn teleports(&self) -> impl Iterator<Item = (&Event, &TeleportCurve)> + '_ {
        self.events_of(EventType::TeleporterTransport)
            .zip(self.teleport_curves.iter())
    }

    /// Arrival events paired with their shuttle phases.
    pub fn arrivals(&self) -> impl Iterator<Item = (&Event, &ShuttleParams)> + '_ {
        self.events_of(EventType::ShuttleArrival)
            .zip(self.shuttle_params.iter())
    }
}

// Frames are compared and printed without their history.
impl PartialEq for CumulativeFrame {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
            && self.is_new_month == other.is_new_month
            && self.is_month_end == other.is_month_end
            && self.day == other.day
            && self.month == other.month
            && self.score == other.score
            && self.city == other.city
            && self.events == other.events
            && self.teleport_curves == other.teleport_curves
            && self.shuttle_params == other.shuttle_params
    }
}

impl std::fmt::Debug for CumulativeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CumulativeFrame")
            .field("info", &self.info)
            .field("is_new_month", &self.is_new_month)
            .field("is_month_end", &self.is_month_end)
            .field("day", &self.day)
            .field("month", &self.month)
            .field("score", &self.score)
            .field("city", &self.city)
            .field("events", &self.events)
            .field("teleport_curves", &self.teleport_curves)
            .field("shuttle_params", &self.shuttle_params)
            .field(
                "previous",
                &self.previous.as_ref().map(|p| p.info.number),
            )
            .finish()
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
    use crate::event::{AnimWindow, EventKind, TeleportPayload};

    fn frame(number: u32) -> CumulativeFrame {
        CumulativeFrame {
            info: FrameInfo::new(number, 1000.0, 0.0),
            is_new_month: false,
            is_month_end: false,
            day: 1,
            month: 0,
            score: 0,
            city: City::new(),
            events: Vec::new(),
            teleport_curves: Vec::new(),
            shuttle_params: Vec::new(),
            previous: None,
        }
    }

    #[test]
    fn first_frame_is_its_own_predecessor() {
        let first = frame(0);
        assert!(!first.has_previous());
        assert_eq!(first.previous().info.number, 0);
    }

    #[test]
    fn previous_link_and_equality_ignore_history() {
        let first = Arc::new(frame(0));
        let mut second = frame(1);
        second.previous = Some(first);
        assert_eq!(second.previous().info.number, 0);

        let mut detached = second.clone();
        detached.previous = None;
        assert_eq!(second, detached);
        assert!(format!("{second:?}").contains("previous: Some(0)"));
    }

    #[test]
    fn teleports_pair_with_curves() {
        let mut f = frame(0);
        let teleport = Event::new(
            EventKind::TeleporterTransport {
                from: BuildingId::new(1),
                to: BuildingId::new(2),
                payload: TeleportPayload::Single { worker: 3 },
            },
            AnimWindow::new(0.1, 0.2),
        );
        f.events = vec![
            Event::new(
                EventKind::NewBuilding {
                    building: BuildingId::new(1),
                },
                AnimWindow::new(0.0, 0.1),
            ),
            teleport.clone(),
        ];
        f.teleport_curves = vec![TeleportCurve {
            init_speed: 10.0,
            init_angle: 0.0,
            target_speed: 10.0,
            target_angle: 0.0,
        }];
        let pairs: Vec<_> = f.teleports().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, &teleport);
        assert_eq!(f.arrivals().count(), 0);
    }
}
