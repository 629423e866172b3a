//! Convenient re-exports for common usage.
//!
//! ```rust
//! use selenia_replay::prelude::*;
//!
//! # fn main() -> Result<(), ReplayError> {
//! let mut session = ReplayBuilder::new()
//!     .with_config(ReplayConfig::deterministic(1))
//!     .start_plaintext("0\n0\n100\n100\n0\n-1\n1\n1 0 10 10\n0")?;
//! let frame = session.handle_frame_plaintext(FrameInfo::new(0, 1000.0, 0.0), "0\n0\n0")?;
//! assert!(frame.building(BuildingId::new(1)).is_some());
//! # Ok(())
//! # }
//! ```
//!
//! The prelude covers sessions and their configuration, frames and what they contain, and the
//! error type. Wire-level helpers stay in [`crate::codec`].

pub use crate::city::{Building, BuildingData, City, Teleporter, Tube, TubeKey};
pub use crate::config::{CachePolicy, FaultPolicy, ReplayConfig, ViewportConfig};
pub use crate::error::ReplayError;
pub use crate::event::{AnimWindow, Event, EventKind, EventType, TeleportPayload};
pub use crate::frame::{CumulativeFrame, FrameInfo};
pub use crate::session::{ReplayBuilder, ReplaySession};
pub use crate::telemetry::{CollectingObserver, TracingObserver, ViolationObserver};
pub use crate::timeline::{Checkpoint, WorkerTimeline};
pub use crate::{BuildingId, PodId, WorkerType};
