//! # Selenia Replay
//!
//! Selenia Replay turns a turn-based simulation's compact replay stream into a sequence of
//! cumulative, point-in-time-queryable frames.
//!
//! Every turn arrives as an opaque payload: a zlib stream wrapped in base64 whose plaintext is a
//! newline-delimited delta (new buildings, score and resource changes, timed events). The crate
//! decodes that delta, merges it into the previous cumulative frame and rebuilds, for every
//! building, a sorted checkpoint timeline of which workers are present at any fractional
//! progress between two turns.
//!
//! ```
//! use selenia_replay::prelude::*;
//! use selenia_replay::codec::payload::compress_payload;
//!
//! # fn main() -> Result<(), ReplayError> {
//! // One building (id 1, type 0) at (10, 10), no resources.
//! let global = "0\n0\n100\n100\n0\n-1\n1\n1 0 10 10\n0";
//! let mut session = ReplayBuilder::new().start_plaintext(global)?;
//!
//! // A new month with score 5, no new buildings and no events.
//! let payload = compress_payload("1\n0\n5\n0\n0\n0")?;
//! let frame = session.handle_frame(FrameInfo::new(0, 1000.0, 0.0), &payload)?;
//!
//! assert_eq!((frame.day, frame.month, frame.score), (1, 1, 5));
//! assert_eq!(frame.city.buildings.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline, leaves first:
//!
//! - [`codec::base91`]: the base-91 packed integers used for pod passenger lists
//! - [`codec::payload`]: base64 + zlib transport encoding
//! - [`codec::delta`]: the line-oriented delta decoder and its [`EventCache`]
//! - [`timeline`]: checkpoint timelines and their mutation primitives
//! - [`accumulator`]: merging a decoded delta into a new [`CumulativeFrame`]
//! - [`session`]: the replay session tying it together in strict turn order

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use accumulator::FrameAccumulator;
pub use animation::{ShuttleParams, TeleportCurve};
pub use city::{Building, BuildingData, City, Teleporter, Tube, TubeKey};
pub use codec::delta::{CityRecord, FrameDelta, GlobalData, MonthEnd, NewMonth};
pub use codec::event_cache::EventCache;
pub use config::{CachePolicy, FaultPolicy, ReplayConfig, ViewportConfig};
pub use error::{DecompressionStage, MalformedReason, ReplayError};
pub use event::{AnimWindow, Event, EventKind, EventType, TeleportPayload};
pub use frame::{CumulativeFrame, FrameInfo};
pub use layout::GameLayout;
pub use session::{ReplayBuilder, ReplaySession};
pub use timeline::{Checkpoint, WorkerList, WorkerTimeline};

pub mod accumulator;
pub mod animation;
pub mod city;
pub mod config;
#[doc(hidden)]
pub mod error;
pub mod event;
pub mod frame;
pub mod layout;
pub mod prelude;
/// Deterministic PCG32 generator used for teleport curve parameters.
pub mod rng;
pub mod session;
pub mod snapshot;
pub mod telemetry;
pub mod timeline;

/// Wire-level decoding: numeric packing, transport encoding, delta records and the event cache.
pub mod codec {
    pub mod base91;
    pub mod delta;
    pub mod event_cache;
    pub mod payload;
}

#[cfg(test)]
pub(crate) mod test_config;

/// Internal module exposing implementation details for property tests and benches.
///
/// Nothing in here is covered by semver guarantees.
#[doc(hidden)]
pub mod __internal {
    pub use crate::accumulator::split_teleport_events;
    pub use crate::codec::base91::{decode_base91, encode_base91, unpack_digit_pairs};
    pub use crate::codec::delta::{parse_city, parse_frame_delta, parse_global};
    pub use crate::timeline::EPSILON;
}

/// A worker (and building) type code. Wire values are 0–99.
pub type WorkerType = u8;

/// Identifier of a building, as assigned by the simulation.
///
/// # Examples
///
/// ```
/// use selenia_replay::BuildingId;
///
/// let id = BuildingId::new(42);
/// assert_eq!(id.as_i32(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct BuildingId(i32);

impl BuildingId {
    /// Creates a new `BuildingId` from its wire value.
    #[inline]
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the underlying wire value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for BuildingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for BuildingId {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<BuildingId> for i32 {
    #[inline]
    fn from(id: BuildingId) -> Self {
        id.0
    }
}

/// Identifier of a transport pod.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PodId(i32);

impl PodId {
    /// Creates a new `PodId` from its wire value.
    #[inline]
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the underlying wire value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for PodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// #########
// # TESTS #
// #########

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
    fn building_ids_order_numerically() {
        let mut ids = vec![BuildingId::new(10), BuildingId::new(9), BuildingId::new(100)];
        ids.sort();
        assert_eq!(
            ids,
            vec![BuildingId::new(9), BuildingId::new(10), BuildingId::new(100)]
        );
    }

    #[test]
    fn building_id_conversions() {
        let id: BuildingId = 7.into();
        let raw: i32 = id.into();
        assert_eq!(raw, 7);
        assert_eq!(format!("{id}"), "7");
    }

    #[test]
    fn pod_id_display() {
        assert_eq!(PodId::new(42).to_string(), "42");
        assert_eq!(PodId::default().as_i32(), 0);
    }
}
