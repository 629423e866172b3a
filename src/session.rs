//! Replay sessions.
//!
//! A session starts from a global record and then takes one payload per turn, strictly in turn
//! order. It owns the event cache the decoder resolves back-references through, so starting a
//! new session always starts from an empty cache.

use std::sync::Arc;

use crate::accumulator::FrameAccumulator;
use crate::codec::delta::{parse_frame_delta, parse_global, DecodeContext, GlobalData};
use crate::codec::event_cache::EventCache;
use crate::codec::payload::decompress_payload;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::frame::{CumulativeFrame, FrameInfo};
use crate::layout::GameLayout;
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};

/// Builds a [`ReplaySession`].
///
/// ```
/// use selenia_replay::{ReplayBuilder, ReplayConfig};
///
/// # fn main() -> Result<(), selenia_replay::ReplayError> {
/// let session = ReplayBuilder::new()
///     .with_config(ReplayConfig::strict())
///     .start_plaintext("0\n0\n100\n100\n0\n-1\n0\n0")?;
/// assert!(session.latest().is_none());
/// # Ok(())
/// # }
/// ```
#[must_use = "ReplayBuilder must be consumed by calling start or start_plaintext"]
#[derive(Default)]
pub struct ReplayBuilder {
    config: ReplayConfig,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for ReplayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            config,
            violation_observer,
        } = self;
        f.debug_struct("ReplayBuilder")
            .field("config", config)
            .field(
                "violation_observer",
                &violation_observer.as_ref().map(|_| "<observer>"),
            )
            .finish()
    }
}

impl ReplayBuilder {
    /// A builder with the default configuration and no observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends soft faults to `observer` instead of logging them through `tracing`.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Starts a session from a compressed global record.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::Decompression`] if the transport encoding is broken.
    /// - Anything [`start_plaintext`](Self::start_plaintext) returns.
    pub fn start(self, payload: &str) -> Result<ReplaySession, ReplayError> {
        let plaintext = decompress_payload(payload)?;
        self.start_plaintext(&plaintext)
    }

    /// Starts a session from a plaintext global record.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::InvalidConfig`] if the configuration does not validate.
    /// - [`ReplayError::MalformedPayload`] if the global record does not decode.
    pub fn start_plaintext(self, text: &str) -> Result<ReplaySession, ReplayError> {
        self.config.validate()?;
        let global = parse_global(text)?;
        let accumulator = FrameAccumulator::with_observer(
            &global,
            &self.config,
            self.violation_observer.clone(),
        );

        tracing::debug!(
            buildings = global.city.buildings.len(),
            resources = global.city.resources,
            simplified = global.simplified,
            cache_capacity = self.config.cache_capacity,
            "replay session started"
        );

        Ok(ReplaySession {
            cache: EventCache::with_capacity(self.config.cache_capacity),
            config: self.config,
            global,
            accumulator,
            violation_observer: self.violation_observer,
            frames: Vec::new(),
        })
    }
}

/// One replay: the global record, the event cache and every frame produced so far.
pub struct ReplaySession {
    config: ReplayConfig,
    global: GlobalData,
    cache: EventCache,
    accumulator: FrameAccumulator,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    frames: Vec<Arc<CumulativeFrame>>,
}

impl std::fmt::Debug for ReplaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySession")
            .field("config", &self.config)
            .field("cache_len", &self.cache.len())
            .field("frames", &self.frames.len())
            .field("accumulator", &self.accumulator)
            .finish_non_exhaustive()
    }
}

impl ReplaySession {
    /// Decodes a compressed turn payload and accumulates it.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::Decompression`] if the transport encoding is broken.
    /// - Anything [`handle_frame_plaintext`](Self::handle_frame_plaintext) returns.
    pub fn handle_frame(
        &mut self,
        info: FrameInfo,
        payload: &str,
    ) -> Result<Arc<CumulativeFrame>, ReplayError> {
        self.check_order(&info)?;
        let plaintext = decompress_payload(payload)?;
        self.process(info, &plaintext)
    }

    /// Decodes a plaintext turn record and accumulates it.
    ///
    /// A rejected frame leaves the session as it was, except that events decoded before a
    /// malformed line stay in the cache.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::OutOfOrderFrame`] if `info.number` does not follow the last frame.
    /// - [`ReplayError::InvalidFrameDuration`] if `info.duration` is not finite and positive.
    /// - [`ReplayError::MalformedPayload`] / [`ReplayError::CacheMiss`] from the decoder.
    /// - [`ReplayError::UnknownBuilding`] / [`ReplayError::UnknownTube`] from accumulation
    ///   under a failing dangling-reference policy.
    pub fn handle_frame_plaintext(
        &mut self,
        info: FrameInfo,
        text: &str,
    ) -> Result<Arc<CumulativeFrame>, ReplayError> {
        self.check_order(&info)?;
        self.process(info, text)
    }

    fn process(&mut self, info: FrameInfo, text: &str) -> Result<Arc<CumulativeFrame>, ReplayError> {
        if !(info.duration.is_finite() && info.duration > 0.0) {
            return Err(ReplayError::InvalidFrameDuration {
                duration: info.duration,
            });
        }

        let ctx = DecodeContext::from_config(&self.config)
            .with_observer(self.violation_observer.clone())
            .with_frame(info.number);
        let delta = parse_frame_delta(text, &mut self.cache, &ctx)?;
        let frame = self.accumulator.accumulate(info, delta)?;
        self.frames.push(Arc::clone(&frame));
        Ok(frame)
    }

    fn check_order(&self, info: &FrameInfo) -> Result<(), ReplayError> {
        let Some(previous) = self.frames.last().map(|f| f.info.number) else {
            return Ok(());
        };
        if info.number > previous {
            return Ok(());
        }
        report_violation_to!(
            self.violation_observer,
            Some(info.number),
            ViolationSeverity::Error,
            ViolationKind::FrameOrder,
            "frame {} received after frame {}",
            info.number,
            previous
        );
        Err(ReplayError::OutOfOrderFrame {
            previous,
            received: info.number,
        })
    }

    /// Every frame produced so far, oldest first.
    #[must_use]
    pub fn frames(&self) -> &[Arc<CumulativeFrame>] {
        &self.frames
    }

    /// The most recent frame.
    #[must_use]
    pub fn latest(&self) -> Option<&Arc<CumulativeFrame>> {
        self.frames.last()
    }

    /// The session's global record.
    #[must_use]
    pub const fn global(&self) -> &GlobalData {
        &self.global
    }

    /// Map to screen layout.
    #[must_use]
    pub const fn layout(&self) -> &GameLayout {
        self.accumulator.layout()
    }

    /// The decoder's event cache.
    #[must_use]
    pub const fn cache(&self) -> &EventCache {
        &self.cache
    }

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &ReplayConfig {
        &self.config
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
    use crate::codec::payload::compress_payload;
    use crate::config::FaultPolicy;
    use crate::telemetry::CollectingObserver;

    const GLOBAL: &str = "0\n0\n100\n100\n0\n-1\n2\n1 0 10 10\n2 3 50 50\n0";

    fn info(number: u32) -> FrameInfo {
        FrameInfo::new(number, 1000.0, 0.0)
    }

    #[test]
    fn starts_from_compressed_or_plaintext_global() {
        let compressed = compress_payload(GLOBAL).unwrap();
        let a = ReplayBuilder::new().start(&compressed).unwrap();
        let b = ReplayBuilder::new().start_plaintext(GLOBAL).unwrap();
        assert_eq!(a.global(), b.global());
        assert_eq!(a.global().city.buildings.len(), 2);
        assert!(a.cache().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ReplayConfig {
            cache_capacity: 0,
            ..ReplayConfig::default()
        };
        let err = ReplayBuilder::new()
            .with_config(config)
            .start_plaintext(GLOBAL)
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidConfig { .. }));
    }

    #[test]
    fn frames_must_strictly_increase() {
        let observer = Arc::new(CollectingObserver::new());
        let mut session = ReplayBuilder::new()
            .with_violation_observer(observer.clone())
            .start_plaintext(GLOBAL)
            .unwrap();
        session.handle_frame_plaintext(info(3), "0\n0\n0").unwrap();

        let err = session
            .handle_frame_plaintext(info(3), "0\n0\n0")
            .unwrap_err();
        assert_eq!(
            err,
            ReplayError::OutOfOrderFrame {
                previous: 3,
                received: 3
            }
        );
        assert!(observer.has_violation(ViolationKind::FrameOrder));

        // Gaps are fine.
        session.handle_frame_plaintext(info(7), "0\n0\n0").unwrap();
        assert_eq!(session.frames().len(), 2);
        assert_eq!(session.latest().unwrap().previous().info.number, 3);
    }

    #[test]
    fn invalid_duration_does_not_touch_the_cache() {
        let mut session = ReplayBuilder::new().start_plaintext(GLOBAL).unwrap();
        let err = session
            .handle_frame_plaintext(FrameInfo::new(0, 0.0, 0.0), "0\n0\n1\n2 0 100 1 2 1 3S")
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidFrameDuration { .. }));
        assert!(session.cache().is_empty());
        assert!(session.latest().is_none());
    }

    #[test]
    fn cache_is_shared_across_frames() {
        let mut session = ReplayBuilder::new().start_plaintext(GLOBAL).unwrap();
        session
            .handle_frame_plaintext(info(0), "0\n0\n1\n2 0 100 1 2 1 3S")
            .unwrap();
        assert_eq!(session.cache().len(), 1);

        let frame = session.handle_frame_plaintext(info(1), "0\n0\n1\n0").unwrap();
        assert_eq!(frame.events.len(), 1);
        assert_eq!(frame.events[0].kind.params(), vec![1, 2, 1, 3, 7]);
    }

    #[test]
    fn strict_cache_miss_fails_the_frame() {
        let config = ReplayConfig {
            cache_miss: FaultPolicy::Fail,
            ..ReplayConfig::default()
        };
        let mut session = ReplayBuilder::new()
            .with_config(config)
            .start_plaintext(GLOBAL)
            .unwrap();
        let err = session.handle_frame_plaintext(info(0), "0\n0\n1\n4").unwrap_err();
        assert_eq!(err, ReplayError::CacheMiss { index: 4, len: 0 });
        assert!(session.frames().is_empty());
    }
}
