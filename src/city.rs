//! Buildings, tubes and teleporters.

use std::collections::BTreeMap;

use crate::timeline::WorkerTimeline;
use crate::{BuildingId, WorkerType};

/// Building type of landing pads, where shuttles drop new workers.
pub const LANDING_BUILDING_TYPE: WorkerType = 0;

/// A building as it appears on the wire: `id type x y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BuildingData {
    /// Identifier.
    pub id: BuildingId,
    /// Building type. Workers whose type matches settle here for good.
    pub building_type: WorkerType,
    /// Map x coordinate.
    pub x: i32,
    /// Map y coordinate.
    pub y: i32,
}

impl BuildingData {
    /// Returns true for landing pads.
    #[must_use]
    pub const fn is_landing(&self) -> bool {
        self.building_type == LANDING_BUILDING_TYPE
    }
}

/// A building in a cumulative frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Building {
    /// Static wire data.
    pub data: BuildingData,
    /// A teleporter terminal is installed here.
    pub has_teleporter: bool,
    /// The terminal is an entrance (otherwise an exit). Meaningless without a terminal.
    pub is_teleporter_entrance: bool,
    /// Workers that reached a building of their own type this month.
    pub settled_workers: u32,
    /// Who stands here during the frame.
    pub timeline: WorkerTimeline,
}

impl Building {
    /// A fresh building with no terminal, no settled workers and an empty timeline.
    #[must_use]
    pub fn new(data: BuildingData) -> Self {
        Self {
            data,
            has_teleporter: false,
            is_teleporter_entrance: false,
            settled_workers: 0,
            timeline: WorkerTimeline::new(),
        }
    }

    /// Shorthand for `self.data.id`.
    #[must_use]
    pub const fn id(&self) -> BuildingId {
        self.data.id
    }

    /// Shorthand for `self.data.building_type`.
    #[must_use]
    pub const fn building_type(&self) -> WorkerType {
        self.data.building_type
    }
}

/// An unordered pair of buildings, stored as `(min, max)`.
///
/// ```
/// use selenia_replay::{BuildingId, TubeKey};
///
/// let key = TubeKey::new(BuildingId::new(10), BuildingId::new(9));
/// assert_eq!(key, TubeKey::new(BuildingId::new(9), BuildingId::new(10)));
/// assert_eq!(key.to_string(), "9-10");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TubeKey {
    low: BuildingId,
    high: BuildingId,
}

impl TubeKey {
    /// Normalizes the pair.
    #[must_use]
    pub fn new(a: BuildingId, b: BuildingId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// The smaller id.
    #[must_use]
    pub const fn low(&self) -> BuildingId {
        self.low
    }

    /// The larger id.
    #[must_use]
    pub const fn high(&self) -> BuildingId {
        self.high
    }
}

impl std::fmt::Display for TubeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// A tube between two buildings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tube {
    /// Endpoints in construction order.
    pub buildings: (BuildingId, BuildingId),
    /// How many pods the tube carries. Starts at 1.
    pub capacity: u32,
}

impl Tube {
    /// A newly built tube.
    #[must_use]
    pub const fn new(a: BuildingId, b: BuildingId) -> Self {
        Self {
            buildings: (a, b),
            capacity: 1,
        }
    }

    /// The normalized key of this tube.
    #[must_use]
    pub fn key(&self) -> TubeKey {
        TubeKey::new(self.buildings.0, self.buildings.1)
    }
}

/// A teleporter. Roles are fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Teleporter {
    /// Where workers go in.
    pub entrance: BuildingId,
    /// Where workers come out.
    pub exit: BuildingId,
}

/// Everything built so far.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct City {
    /// Buildings in introduction order.
    pub buildings: Vec<Building>,
    /// Tubes by endpoint pair.
    pub tubes: BTreeMap<TubeKey, Tube>,
    /// Teleporters in installation order.
    pub teleporters: Vec<Teleporter>,
    /// Resources at the end of the frame.
    pub resources: i64,
    index: BTreeMap<BuildingId, usize>,
}

impl City {
    /// An empty city.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a building. Returns `false`, leaving the city unchanged, if the id is taken.
    pub fn add_building(&mut self, building: Building) -> bool {
        let id = building.id();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.buildings.len());
        self.buildings.push(building);
        true
    }

    /// Looks a building up by id.
    #[must_use]
    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.index.get(&id).and_then(|&i| self.buildings.get(i))
    }

    /// Looks a building up by id, mutably.
    pub fn building_mut(&mut self, id: BuildingId) -> Option<&mut Building> {
        let index = *self.index.get(&id)?;
        self.buildings.get_mut(index)
    }

    /// Returns true if a building with this id exists.
    #[must_use]
    pub fn contains(&self, id: BuildingId) -> bool {
        self.index.contains_key(&id)
    }

    /// Looks a tube up by its endpoints, in either order.
    #[must_use]
    pub fn tube(&self, a: BuildingId, b: BuildingId) -> Option<&Tube> {
        self.tubes.get(&TubeKey::new(a, b))
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

    fn data(id: i32, building_type: WorkerType) -> BuildingData {
        BuildingData {
            id: BuildingId::new(id),
            building_type,
            x: id * 10,
            y: 0,
        }
    }

    #[test]
    fn buildings_are_indexed_by_id() {
        let mut city = City::new();
        assert!(city.add_building(Building::new(data(5, 1))));
        assert!(city.add_building(Building::new(data(2, 0))));
        assert_eq!(city.building(BuildingId::new(2)).unwrap().data.x, 20);
        assert!(city.building(BuildingId::new(2)).unwrap().data.is_landing());
        assert!(city.building(BuildingId::new(3)).is_none());

        city.building_mut(BuildingId::new(5)).unwrap().settled_workers = 4;
        assert_eq!(city.buildings[0].settled_workers, 4);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut city = City::new();
        assert!(city.add_building(Building::new(data(1, 1))));
        assert!(!city.add_building(Building::new(data(1, 2))));
        assert_eq!(city.buildings.len(), 1);
        assert_eq!(city.building(BuildingId::new(1)).unwrap().building_type(), 1);
    }

    #[test]
    fn tube_lookup_ignores_endpoint_order() {
        let mut city = City::new();
        let tube = Tube::new(BuildingId::new(7), BuildingId::new(3));
        city.tubes.insert(tube.key(), tube);
        assert_eq!(city.tube(BuildingId::new(3), BuildingId::new(7)).unwrap().capacity, 1);
        assert_eq!(tube.key().low(), BuildingId::new(3));
        assert_eq!(tube.key().high(), BuildingId::new(7));
    }

    #[test]
    fn tube_keys_order_numerically() {
        let a = TubeKey::new(BuildingId::new(10), BuildingId::new(2));
        let b = TubeKey::new(BuildingId::new(9), BuildingId::new(3));
        assert!(a < b);
    }
}
