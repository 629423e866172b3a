//! Per-event animation parameters derived during accumulation.
//!
//! The renderer needs a few values that are not on the wire: when a shuttle stops shaking out
//! workers, how big it is when it leaves the screen, which curve a teleported worker follows.
//! They are computed once per frame and stored positionally next to the events they belong to.

use crate::event::AnimWindow;
use crate::rng::Rng;

/// Fraction of an arrival spent shaking workers out of the shuttle.
pub const SHAKE_DURATION: f64 = 0.4;

/// Shuttle scale at the screen edge.
pub const HIGHEST_SHUTTLE_SCALE: f64 = 4.0;

/// Shuttle sprite height in pixels.
pub const SHUTTLE_HEIGHT: f64 = 240.0;

/// Linear interpolation between `a` and `b`.
#[inline]
#[must_use]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Inverse of [`lerp`], clamped to `[0, 1]`.
///
/// A degenerate range is a step at `b`.
#[inline]
#[must_use]
pub fn unlerp(a: f64, b: f64, v: f64) -> f64 {
    if a == b {
        return if v >= b { 1.0 } else { 0.0 };
    }
    ((v - a) / (b - a)).clamp(0.0, 1.0)
}

/// Timing of a shuttle arrival, as fractions of the arrival's window.
///
/// The shuttle flies in from the bottom of the screen, shakes the workers out, then flies out
/// through the top. The lower the landing building sits, the shorter the fly-in and the longer
/// the fly-out.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShuttleParams {
    /// Length of the shake phase.
    pub shake_duration: f64,
    /// Shuttle scale when it leaves the screen.
    pub fly_out_end_scale: f64,
    /// Shuttle scale when it enters the screen.
    pub fly_in_start_scale: f64,
    /// End of the fly-in phase (start of the shake).
    pub fly_in_end: f64,
    /// End of the shake phase (start of the fly-out).
    pub shake_out_workers_end: f64,
    /// End of the fly-out phase.
    pub fly_out_end: f64,
}

impl ShuttleParams {
    /// Computes the phases for a landing building drawn at vertical screen position `screen_y`
    /// on a viewport `viewport_height` pixels tall.
    ///
    /// ```
    /// use selenia_replay::ShuttleParams;
    ///
    /// // Dead center: fly-in and fly-out take the same time.
    /// let params = ShuttleParams::for_landing(540.0, 1080.0);
    /// assert!((params.fly_in_end - 0.3).abs() < 1e-9);
    /// assert!((params.shake_out_workers_end - 0.7).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn for_landing(screen_y: f64, viewport_height: f64) -> Self {
        let v_pad = SHUTTLE_HEIGHT * HIGHEST_SHUTTLE_SCALE / 2.0;
        let fly_out_ratio = unlerp(-v_pad, viewport_height + v_pad, screen_y);
        let fly_out_duration = fly_out_ratio * (1.0 - SHAKE_DURATION);
        let fly_in_duration = 1.0 - SHAKE_DURATION - fly_out_duration;
        Self {
            shake_duration: SHAKE_DURATION,
            fly_out_end_scale: lerp(1.0, HIGHEST_SHUTTLE_SCALE, fly_out_ratio),
            fly_in_start_scale: lerp(1.0, HIGHEST_SHUTTLE_SCALE, 1.0 - fly_out_ratio),
            fly_in_end: fly_in_duration,
            shake_out_workers_end: fly_in_duration + SHAKE_DURATION,
            fly_out_end: 1.0,
        }
    }

    /// The frame-local instant the shake starts.
    #[must_use]
    pub fn shake_start(&self, window: &AnimWindow) -> f64 {
        window.lerp(self.fly_in_end)
    }

    /// Frame-local instants at which each of `count` workers has left the shuttle, evenly
    /// spread over the shake phase. The last one lands exactly at the end of the shake.
    #[must_use]
    pub fn worker_instants(&self, window: &AnimWindow, count: usize) -> Vec<f64> {
        (0..count)
            .map(|i| {
                let t = (i + 1) as f64 / count as f64;
                window.lerp(lerp(self.fly_in_end, self.shake_out_workers_end, t))
            })
            .collect()
    }
}

/// Control values of the cubic path a teleported worker follows.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TeleportCurve {
    /// Speed leaving the entrance.
    pub init_speed: f64,
    /// Direction leaving the entrance, in radians.
    pub init_angle: f64,
    /// Speed reaching the exit.
    pub target_speed: f64,
    /// Direction reaching the exit, in radians.
    pub target_angle: f64,
}

impl TeleportCurve {
    /// Draws speeds in `[10, 20)` and angles in `[0, 2π)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        const SPEED: std::ops::Range<f64> = 10.0..20.0;
        const ANGLE: std::ops::Range<f64> = 0.0..std::f64::consts::TAU;
        Self {
            init_speed: rng.gen_range_f64(SPEED),
            init_angle: rng.gen_range_f64(ANGLE),
            target_speed: rng.gen_range_f64(SPEED),
            target_angle: rng.gen_range_f64(ANGLE),
        }
    }

    /// Position on the path at `x ∈ [0, 1]`, in map coordinates.
    ///
    /// Passes through `from` at 0 and `to` at 1.
    #[must_use]
    pub fn position(&self, from: (f64, f64), to: (f64, f64), x: f64) -> (f64, f64) {
        let axis = |init: f64, target: f64, a: f64, b: f64| {
            (init + target - 2.0 * b + 2.0 * a) * x.powi(3)
                + (-2.0 * init - target + 3.0 * b - 3.0 * a) * x.powi(2)
                + init * x
                + a
        };
        let (init_sin, init_cos) = self.init_angle.sin_cos();
        let (target_sin, target_cos) = self.target_angle.sin_cos();
        (
            axis(
                self.init_speed * init_cos,
                self.target_speed * target_cos,
                from.0,
                to.0,
            ),
            axis(
                self.init_speed * init_sin,
                self.target_speed * target_sin,
                from.1,
                to.1,
            ),
        )
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
    use crate::rng::{Pcg32, SeedableRng};

    const EPS: f64 = 1e-9;

    #[test]
    fn unlerp_clamps() {
        assert_eq!(unlerp(0.0, 10.0, -5.0), 0.0);
        assert_eq!(unlerp(0.0, 10.0, 15.0), 1.0);
        assert!((unlerp(0.0, 10.0, 2.5) - 0.25).abs() < EPS);
        assert_eq!(unlerp(3.0, 3.0, 2.0), 0.0);
        assert_eq!(unlerp(3.0, 3.0, 3.0), 1.0);
    }

    #[test]
    fn shuttle_phases_partition_the_window() {
        for y in [-1000.0, 0.0, 300.0, 540.0, 1080.0, 5000.0] {
            let p = ShuttleParams::for_landing(y, 1080.0);
            assert!(p.fly_in_end >= 0.0);
            assert!((p.shake_out_workers_end - p.fly_in_end - SHAKE_DURATION).abs() < EPS);
            assert!(p.shake_out_workers_end <= p.fly_out_end + EPS);
            assert!((1.0..=HIGHEST_SHUTTLE_SCALE).contains(&p.fly_out_end_scale));
        }
    }

    #[test]
    fn low_landing_flies_out_longer() {
        let high = ShuttleParams::for_landing(100.0, 1080.0);
        let low = ShuttleParams::for_landing(1000.0, 1080.0);
        assert!(low.fly_in_end < high.fly_in_end);
        assert!(low.fly_out_end_scale > high.fly_out_end_scale);
    }

    #[test]
    fn worker_instants_span_the_shake() {
        let params = ShuttleParams::for_landing(540.0, 1080.0);
        let window = AnimWindow::new(0.0, 1.0);
        let instants = params.worker_instants(&window, 4);
        assert_eq!(instants.len(), 4);
        assert!((instants[0] - 0.4).abs() < EPS);
        assert!((instants[3] - 0.7).abs() < EPS);
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
        assert!((params.shake_start(&window) - 0.3).abs() < EPS);
    }

    #[test]
    fn teleport_curve_hits_endpoints() {
        let mut rng = Pcg32::seed_from_u64(3);
        let curve = TeleportCurve::random(&mut rng);
        let from = (10.0, 20.0);
        let to = (200.0, -40.0);
        let start = curve.position(from, to, 0.0);
        let end = curve.position(from, to, 1.0);
        assert!((start.0 - from.0).abs() < EPS && (start.1 - from.1).abs() < EPS);
        assert!((end.0 - to.0).abs() < 1e-6 && (end.1 - to.1).abs() < 1e-6);
    }

    #[test]
    fn teleport_curve_ranges() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..200 {
            let c = TeleportCurve::random(&mut rng);
            assert!((10.0..20.0).contains(&c.init_speed));
            assert!((10.0..20.0).contains(&c.target_speed));
            assert!((0.0..std::f64::consts::TAU).contains(&c.init_angle));
            assert!((0.0..std::f64::consts::TAU).contains(&c.target_angle));
        }
    }
}
