//! PCG32 (XSH-RR variant, 64-bit state).
//!
//! Teleport paths get randomized curve parameters. Drawing them from a seeded generator keeps two
//! replays of the same match visually identical.
//!
//! ```rust
//! use selenia_replay::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut a = Pcg32::seed_from_u64(12345);
//! let mut b = Pcg32::seed_from_u64(12345);
//! assert_eq!(a.next_u32(), b.next_u32());
//!
//! let speed = a.gen_range_f64(10.0..20.0);
//! assert!((10.0..20.0).contains(&speed));
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};

/// PCG32 random number generator. Not cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

/// Default increment for single-stream PCG32.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier constant for the LCG step.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a new generator with the given state and stream.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        // The increment must be odd
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Generates the next 32-bit random value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit random value by combining two 32-bit values.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }
}

/// Trait for seeding random number generators.
pub trait SeedableRng: Sized {
    /// Creates a new RNG seeded from a 64-bit value.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }
}

/// Random value generation on top of a 32/64-bit source.
pub trait Rng {
    /// Returns the next 32-bit random value.
    fn next_u32(&mut self) -> u32;

    /// Returns the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Returns a uniformly distributed `f64` in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64 {
        // Upper 53 bits: the f64 mantissa precision
        let val = self.next_u64() >> 11;
        val as f64 / (1u64 << 53) as f64
    }

    /// Returns a uniformly distributed `f64` in `[range.start, range.end)`.
    ///
    /// # Empty Range Behavior
    /// If the range is empty or not finite, reports a violation via telemetry and returns
    /// `range.start`.
    fn gen_range_f64(&mut self, range: std::ops::Range<f64>) -> f64 {
        let span = range.end - range.start;
        if !(span.is_finite() && span > 0.0) {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::InternalError,
                "gen_range_f64 called with empty range [{}..{})",
                range.start,
                range.end
            );
            return range.start;
        }
        range.start + self.next_f64() * span
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        Self::next_u32(self)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        Self::next_u64(self)
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
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(42);
        let mut b = Pcg32::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let same = (0..32).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 4);
    }

    #[test]
    fn next_f64_in_unit_interval() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn gen_range_f64_respects_bounds() {
        let mut rng = Pcg32::seed_from_u64(99);
        for _ in 0..1000 {
            let v = rng.gen_range_f64(10.0..20.0);
            assert!((10.0..20.0).contains(&v));
        }
    }

    #[test]
    fn gen_range_f64_empty_range_returns_start() {
        let mut rng = Pcg32::seed_from_u64(0);
        assert_eq!(rng.gen_range_f64(5.0..5.0), 5.0);
        assert_eq!(rng.gen_range_f64(5.0..1.0), 5.0);
    }

    #[test]
    fn clone_continues_identically() {
        let mut rng = Pcg32::seed_from_u64(1234);
        let _ = rng.next_u32();
        let mut copy = rng.clone();
        assert_eq!(rng.next_u64(), copy.next_u64());
    }
}
