//! Map-to-screen transform.
//!
//! The map's bounding box is either fitted into the viewport (minus room for sprites and the
//! HUD) or drawn at a fixed ratio supplied by the server, then scaled down to fit. Shuttle
//! timing depends on where a landing building ends up vertically, so the accumulator needs the
//! same transform as the renderer.

use crate::codec::delta::GlobalData;
use crate::config::ViewportConfig;

/// Largest uniform scale that fits a `width`x`height` box into `max_width`x`max_height`.
///
/// A degenerate dimension is ignored; a fully degenerate box gets scale 1.
#[must_use]
pub fn fit_aspect_ratio(width: f64, height: f64, max_width: f64, max_height: f64) -> f64 {
    match (width > 0.0, height > 0.0) {
        (true, true) => (max_width / width).min(max_height / height),
        (true, false) => max_width / width,
        (false, true) => max_height / height,
        (false, false) => 1.0,
    }
}

/// Where the map sits on screen.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GameLayout {
    /// Map-space origin (left edge of the bounding box).
    pub min_x: f64,
    /// Map-space origin (top edge of the bounding box).
    pub min_y: f64,
    /// Map units to pixels.
    pub game_ratio: f64,
    /// True if `game_ratio` came from the server rather than from fitting.
    pub custom_ratio: bool,
    /// Extra scale applied to the whole game zone (1 unless `custom_ratio`).
    pub game_scale: f64,
    /// Left edge of the game zone in pixels.
    pub game_x: f64,
    /// Top edge of the game zone in pixels.
    pub game_y: f64,
    /// Game zone width in pixels.
    pub game_width: f64,
    /// Game zone height in pixels.
    pub game_height: f64,
}

impl GameLayout {
    /// Computes the layout of `global`'s bounding box on `viewport`.
    ///
    /// ```
    /// use selenia_replay::{GameLayout, ViewportConfig};
    /// use selenia_replay::__internal::parse_global;
    ///
    /// let global = parse_global("0\n0\n100\n100\n0\n-1\n0\n0").unwrap();
    /// let layout = GameLayout::new(&global, &ViewportConfig::default());
    /// // (1080 - 260 - 84) / 100
    /// assert!((layout.game_ratio - 7.36).abs() < 1e-9);
    /// assert_eq!(layout.game_scale, 1.0);
    /// ```
    #[must_use]
    pub fn new(global: &GlobalData, viewport: &ViewportConfig) -> Self {
        let map_width = global.max_x - global.min_x;
        let map_height = global.max_y - global.min_y;

        let custom_ratio = global.game_ratio > 0.0;
        let game_ratio = if custom_ratio {
            global.game_ratio
        } else {
            fit_aspect_ratio(
                map_width,
                map_height,
                viewport.width - viewport.asset_padding,
                viewport.height - viewport.asset_padding - viewport.hud_height,
            )
        };

        let game_width = map_width * game_ratio;
        let game_height = map_height * game_ratio;
        let game_x = viewport.width / 2.0 - game_width / 2.0;
        let game_y = viewport.height / 2.0 - game_height / 2.0 + viewport.hud_height / 2.0;

        let game_scale = if custom_ratio {
            fit_aspect_ratio(
                game_width,
                game_height,
                viewport.width - viewport.custom_asset_padding,
                viewport.height - viewport.custom_asset_padding - viewport.custom_hud_height,
            )
        } else {
            1.0
        };

        Self {
            min_x: global.min_x,
            min_y: global.min_y,
            game_ratio,
            custom_ratio,
            game_scale,
            game_x,
            game_y,
            game_width,
            game_height,
        }
    }

    /// Map coordinates to game-zone pixels (before `game_scale`).
    #[must_use]
    pub fn to_game_zone(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.game_x + (x - self.min_x) * self.game_ratio,
            self.game_y + (y - self.min_y) * self.game_ratio,
        )
    }

    /// Vertical screen position used for shuttle timing.
    #[must_use]
    pub fn screen_y(&self, x: f64, y: f64) -> f64 {
        self.to_game_zone(x, y).1 * self.game_scale
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
    use crate::codec::delta::CityRecord;

    fn global(min: (f64, f64), max: (f64, f64), ratio: f64) -> GlobalData {
        GlobalData {
            min_x: min.0,
            min_y: min.1,
            max_x: max.0,
            max_y: max.1,
            simplified: false,
            game_ratio: ratio,
            city: CityRecord::default(),
        }
    }

    #[test]
    fn auto_fit_centers_the_map() {
        let layout = GameLayout::new(&global((0.0, 0.0), (100.0, 100.0), -1.0), &ViewportConfig::default());
        assert!(!layout.custom_ratio);
        assert!((layout.game_x - (960.0 - 368.0)).abs() < 1e-9);
        assert!((layout.game_y - (540.0 - 368.0 + 42.0)).abs() < 1e-9);
        let (x, y) = layout.to_game_zone(50.0, 50.0);
        assert!((x - 960.0).abs() < 1e-9);
        assert!((y - 582.0).abs() < 1e-9);
    }

    #[test]
    fn custom_ratio_scales_to_fit() {
        let layout = GameLayout::new(&global((0.0, 0.0), (1000.0, 500.0), 4.0), &ViewportConfig::default());
        assert!(layout.custom_ratio);
        assert_eq!(layout.game_ratio, 4.0);
        // 4000x2000 into 1820x920
        assert!((layout.game_scale - 0.455).abs() < 1e-9);
        let unscaled = layout.to_game_zone(0.0, 250.0).1;
        assert!((layout.screen_y(0.0, 250.0) - unscaled * 0.455).abs() < 1e-9);
    }

    #[test]
    fn degenerate_boxes_do_not_divide_by_zero() {
        assert_eq!(fit_aspect_ratio(0.0, 0.0, 100.0, 100.0), 1.0);
        assert_eq!(fit_aspect_ratio(50.0, 0.0, 100.0, 100.0), 2.0);
        let layout = GameLayout::new(&global((5.0, 5.0), (5.0, 5.0), 0.0), &ViewportConfig::default());
        assert!(layout.game_ratio.is_finite());
        assert!(layout.screen_y(5.0, 5.0).is_finite());
    }
}
