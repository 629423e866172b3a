//! The decoder's deduplication dictionary.
//!
//! Frames repeat the same transports over and over, so the server sends a fully spelled-out
//! event once and afterwards refers to it by its position in this cache. The cache only ever
//! grows, up to a fixed capacity, and then stops recording. It never evicts, so an index stays
//! valid for the whole session.

use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::event::Event;

/// Bounded, append-only list of previously decoded events.
///
/// ```
/// use selenia_replay::{AnimWindow, Event, EventCache, EventKind, BuildingId};
///
/// let mut cache = EventCache::with_capacity(1);
/// let event = Event::new(
///     EventKind::NewBuilding { building: BuildingId::new(3) },
///     AnimWindow::new(0.0, 10.0),
/// );
/// assert!(cache.record(&event));
/// assert!(!cache.record(&event));
/// assert_eq!(cache.get(0), Some(&event));
/// assert_eq!(cache.rejected(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EventCache {
    events: Vec<Event>,
    capacity: usize,
    rejected: u64,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl EventCache {
    /// An empty cache holding up to [`DEFAULT_CACHE_CAPACITY`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cache holding up to `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            capacity,
            rejected: 0,
        }
    }

    /// Stores a copy of `event` if there is room. Returns whether it was stored.
    pub fn record(&mut self, event: &Event) -> bool {
        if self.is_full() {
            self.rejected += 1;
            return false;
        }
        self.events.push(event.clone());
        true
    }

    /// The event at `index`, if recorded.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true once the cache has stopped recording.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// How many events were offered after the cache filled up.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Forgets everything. Called when a new session starts.
    pub fn clear(&mut self) {
        self.events.clear();
        self.rejected = 0;
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
    use crate::event::{AnimWindow, EventKind};
    use crate::BuildingId;

    fn event(id: i32) -> Event {
        Event::new(
            EventKind::NewBuilding {
                building: BuildingId::new(id),
            },
            AnimWindow::new(0.0, 1.0),
        )
    }

    #[test]
    fn default_capacity_is_one_thousand() {
        assert_eq!(EventCache::new().capacity(), 1000);
    }

    #[test]
    fn stops_growing_at_capacity() {
        let mut cache = EventCache::with_capacity(3);
        for id in 0..5 {
            cache.record(&event(id));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.is_full());
        assert_eq!(cache.rejected(), 2);
        assert_eq!(cache.get(2), Some(&event(2)));
        assert_eq!(cache.get(3), None);
    }

    #[test]
    fn recorded_events_do_not_alias_the_original() {
        let mut cache = EventCache::new();
        let mut live = event(1);
        cache.record(&live);
        live.window.start = 99.0;
        assert_eq!(cache.get(0).unwrap().window.start, 0.0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = EventCache::with_capacity(1);
        cache.record(&event(1));
        cache.record(&event(2));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.rejected(), 0);
        assert!(cache.record(&event(3)));
    }
}
