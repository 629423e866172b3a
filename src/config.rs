//! Configuration for replay sessions.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `ReplayConfig` | Decoder cache and fault handling | `strict()`, `referee_compatible()` |
//! | `ViewportConfig` | Screen geometry used for shuttle timing | `Default` (1920x1080) |
//!
//! # Example
//!
//! ```
//! use selenia_replay::{FaultPolicy, ReplayBuilder, ReplayConfig};
//!
//! let config = ReplayConfig {
//!     cache_miss: FaultPolicy::Fail,
//!     ..ReplayConfig::default()
//! };
//! let builder = ReplayBuilder::new().with_config(config);
//! ```

use crate::ReplayError;

/// Default maximum number of entries in the event cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Upper bound accepted by [`ReplayConfig::validate`] for the cache capacity.
pub const MAX_CACHE_CAPACITY: usize = 1 << 20;

/// Which decoded events are recorded in the event cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum CachePolicy {
    /// Only pod transports are recorded. Back-references always resolve to a pod transport.
    #[default]
    PodTransportOnly,
    /// Every fully spelled-out event line is recorded, whatever its type.
    ///
    /// This matches servers that index every event they serialize.
    EveryDecodedEvent,
}

/// How a recoverable inconsistency is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum FaultPolicy {
    /// Report a violation and carry on with a substitute (or by skipping the mutation).
    #[default]
    Tolerate,
    /// Abort the current frame with an error.
    Fail,
}

impl FaultPolicy {
    /// Returns true if this policy turns faults into errors.
    #[must_use]
    pub const fn is_fail(self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// Screen geometry the map is fitted into.
///
/// Only the vertical position of landing buildings depends on it (through the shuttle fly-out
/// ratio), so the defaults match the reference 1920x1080 viewer.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ViewportConfig {
    /// Viewport width in pixels.
    ///
    /// Default: 1920
    pub width: f64,
    /// Viewport height in pixels.
    ///
    /// Default: 1080
    pub height: f64,
    /// Height of the HUD band when the map is auto-fitted.
    ///
    /// Default: 84
    pub hud_height: f64,
    /// Margin reserved around an auto-fitted map for building sprites.
    ///
    /// Default: 260
    pub asset_padding: f64,
    /// Height of the HUD band when the map uses a manual scale.
    ///
    /// Default: 60
    pub custom_hud_height: f64,
    /// Margin reserved around a manually scaled map.
    ///
    /// Default: 100
    pub custom_asset_padding: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            hud_height: 84.0,
            asset_padding: 260.0,
            custom_hud_height: 60.0,
            custom_asset_padding: 100.0,
        }
    }
}

impl ViewportConfig {
    /// Validates the viewport geometry.
    pub fn validate(&self) -> Result<(), ReplayError> {
        let fields = [
            ("width", self.width),
            ("height", self.height),
            ("hud_height", self.hud_height),
            ("asset_padding", self.asset_padding),
            ("custom_hud_height", self.custom_hud_height),
            ("custom_asset_padding", self.custom_asset_padding),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ReplayError::InvalidConfig {
                    info: format!("viewport.{field} must be finite and non-negative, got {value}"),
                });
            }
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(ReplayError::InvalidConfig {
                info: format!(
                    "viewport must have a positive size, got {}x{}",
                    self.width, self.height
                ),
            });
        }
        Ok(())
    }
}

/// Configuration for a replay session.
///
/// New fields may be added; construct with `..ReplayConfig::default()`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[must_use = "ReplayConfig has no effect unless passed to ReplayBuilder::with_config()"]
pub struct ReplayConfig {
    /// Maximum number of events the cache records before it stops growing.
    ///
    /// Default: 1000
    pub cache_capacity: usize,
    /// Which events are recorded in the cache.
    ///
    /// Default: [`CachePolicy::PodTransportOnly`]
    pub cache_policy: CachePolicy,
    /// What to do with a back-reference past the end of the cache.
    ///
    /// Default: [`FaultPolicy::Tolerate`] (a placeholder event is substituted)
    pub cache_miss: FaultPolicy,
    /// What to do when an event names a building or tube that does not exist.
    ///
    /// Default: [`FaultPolicy::Tolerate`] (the mutation is skipped and reported as critical)
    pub dangling_references: FaultPolicy,
    /// Screen geometry used for shuttle timing.
    pub viewport: ViewportConfig,
    /// Seed for teleport curve parameters. Mixed with the frame number per frame.
    ///
    /// Default: 0
    pub teleport_seed: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_policy: CachePolicy::PodTransportOnly,
            cache_miss: FaultPolicy::Tolerate,
            dangling_references: FaultPolicy::Tolerate,
            viewport: ViewportConfig::default(),
            teleport_seed: 0,
        }
    }
}

impl ReplayConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every inconsistency aborts the frame.
    ///
    /// ```
    /// use selenia_replay::{FaultPolicy, ReplayConfig};
    ///
    /// let config = ReplayConfig::strict();
    /// assert_eq!(config.cache_miss, FaultPolicy::Fail);
    /// assert_eq!(config.dangling_references, FaultPolicy::Fail);
    /// ```
    pub fn strict() -> Self {
        Self {
            cache_miss: FaultPolicy::Fail,
            dangling_references: FaultPolicy::Fail,
            ..Self::default()
        }
    }

    /// Indexes every decoded event, for servers that back-reference any event type.
    pub fn referee_compatible() -> Self {
        Self {
            cache_policy: CachePolicy::EveryDecodedEvent,
            ..Self::default()
        }
    }

    /// Same as the default configuration with a fixed teleport seed.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            teleport_seed: seed,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.cache_capacity < 1 || self.cache_capacity > MAX_CACHE_CAPACITY {
            return Err(ReplayError::InvalidConfig {
                info: format!(
                    "cache_capacity must be in 1..={}, got {}",
                    MAX_CACHE_CAPACITY, self.cache_capacity
                ),
            });
        }
        self.viewport.validate()
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
    fn defaults_are_valid() {
        let config = ReplayConfig::default();
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.cache_policy, CachePolicy::PodTransportOnly);
        assert!(!config.cache_miss.is_fail());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_are_valid() {
        for config in [
            ReplayConfig::strict(),
            ReplayConfig::referee_compatible(),
            ReplayConfig::deterministic(9),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
        assert_eq!(
            ReplayConfig::referee_compatible().cache_policy,
            CachePolicy::EveryDecodedEvent
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = ReplayConfig {
            cache_capacity: 0,
            ..ReplayConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ReplayError::InvalidConfig { .. }));
        assert!(err.to_string().contains("cache_capacity"));
    }

    #[test]
    fn degenerate_viewport_rejected() {
        let config = ReplayConfig {
            viewport: ViewportConfig {
                height: 0.0,
                ..ViewportConfig::default()
            },
            ..ReplayConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReplayConfig {
            viewport: ViewportConfig {
                hud_height: f64::NAN,
                ..ViewportConfig::default()
            },
            ..ReplayConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hud_height"));
    }
}
