//! Fixture builders shared by the integration tests.
//!
//! ```ignore
//! mod common;
//! use common::{GlobalFixture, FrameFixture};
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use selenia_replay::__internal::encode_base91;
use selenia_replay::codec::payload::compress_payload;
use selenia_replay::{EventType, FrameInfo};

/// Default turn length in wire units.
pub const TURN: f64 = 1000.0;

/// Frame metadata with the default turn length.
pub fn info(number: u32) -> FrameInfo {
    FrameInfo::new(number, TURN, f64::from(number) * TURN)
}

/// Builds a global record.
#[derive(Debug, Clone)]
pub struct GlobalFixture {
    bounds: (i32, i32, i32, i32),
    simplified: bool,
    game_ratio: f64,
    buildings: Vec<(i32, u8, i32, i32)>,
    resources: i64,
}

impl Default for GlobalFixture {
    fn default() -> Self {
        Self {
            bounds: (0, 0, 100, 100),
            simplified: false,
            game_ratio: -1.0,
            buildings: Vec::new(),
            resources: 0,
        }
    }
}

impl GlobalFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn building(mut self, id: i32, building_type: u8, x: i32, y: i32) -> Self {
        self.buildings.push((id, building_type, x, y));
        self
    }

    pub fn resources(mut self, resources: i64) -> Self {
        self.resources = resources;
        self
    }

    pub fn plaintext(&self) -> String {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        let mut lines = vec![
            min_x.to_string(),
            min_y.to_string(),
            max_x.to_string(),
            max_y.to_string(),
            u8::from(self.simplified).to_string(),
            self.game_ratio.to_string(),
        ];
        lines.extend(city_lines(&self.buildings, self.resources));
        lines.join("\n")
    }

    pub fn compressed(&self) -> String {
        compress_payload(&self.plaintext()).unwrap()
    }
}

fn city_lines(buildings: &[(i32, u8, i32, i32)], resources: i64) -> Vec<String> {
    let mut lines = vec![buildings.len().to_string()];
    lines.extend(
        buildings
            .iter()
            .map(|(id, t, x, y)| format!("{id} {t} {x} {y}")),
    );
    lines.push(resources.to_string());
    lines
}

/// Builds a frame record.
#[derive(Debug, Clone, Default)]
pub struct FrameFixture {
    new_month: Option<(i64, Vec<(i32, u8, i32, i32)>, i64)>,
    month_end: Option<(i64, i64)>,
    events: Vec<String>,
}

impl FrameFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_month(mut self, score: i64, buildings: Vec<(i32, u8, i32, i32)>, resources: i64) -> Self {
        self.new_month = Some((score, buildings, resources));
        self
    }

    pub fn month_end(mut self, score: i64, resources: i64) -> Self {
        self.month_end = Some((score, resources));
        self
    }

    /// A fully spelled-out event line.
    pub fn event(mut self, event_type: EventType, start: i64, end: i64, params: &[i64]) -> Self {
        let head = [i64::from(event_type.code()), start, end];
        let line: Vec<String> = head.iter().chain(params).map(ToString::to_string).collect();
        self.events.push(line.join(" "));
        self
    }

    /// A pod transport with its passengers packed in base 91.
    pub fn pod(mut self, start: i64, end: i64, from: i32, to: i32, pod: i32, workers: &[u8]) -> Self {
        let packed = encode_base91(workers).unwrap();
        self.events.push(format!(
            "{} {start} {end} {from} {to} {pod} {packed}",
            EventType::PodTransport.code()
        ));
        self
    }

    /// A back-reference into the event cache.
    pub fn cached(mut self, index: i64) -> Self {
        self.events.push(index.to_string());
        self
    }

    pub fn plaintext(&self) -> String {
        let mut lines = vec![
            u8::from(self.new_month.is_some()).to_string(),
            u8::from(self.month_end.is_some()).to_string(),
        ];
        if let Some((score, buildings, resources)) = &self.new_month {
            lines.push(score.to_string());
            lines.extend(city_lines(buildings, *resources));
        }
        if let Some((score, resources)) = self.month_end {
            lines.push(score.to_string());
            lines.push(resources.to_string());
        }
        lines.push(self.events.len().to_string());
        lines.extend(self.events.iter().cloned());
        lines.join("\n")
    }

    pub fn compressed(&self) -> String {
        compress_payload(&self.plaintext()).unwrap()
    }
}
