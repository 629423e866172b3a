//! Base-91 packed integers.
//!
//! A pod's passenger list is a sequence of worker type codes (each `0..100`). The server
//! concatenates them as two-digit decimal groups into one big integer and writes that integer
//! in base 91 using a fixed printable alphabet. Decoding reverses both steps.
//!
//! The value is accumulated directly in base-100 limbs, so the limbs *are* the digit pairs and
//! no decimal string round trip is needed.
//!
//! ```
//! use selenia_replay::__internal::{decode_base91, encode_base91, unpack_digit_pairs};
//!
//! let text = encode_base91(&[3, 7]).unwrap();
//! assert_eq!(text, "3S");
//! assert_eq!(unpack_digit_pairs(&decode_base91(&text).unwrap()), vec![3, 7]);
//! ```
//!
//! Leading `0` codes cannot be represented: `[0, 5]` and `[5]` pack to the same integer.

use crate::error::{MalformedReason, ReplayError};

/// The 91-character alphabet, in digit order.
pub const ALPHABET: &[u8; 91] =
    b"0123456789:<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]^_`abcdefghijklmnopqrstuvwxyz{|}~!\"#$%&()*+,-./";

const BASE: u32 = 91;
const LIMB: u32 = 100;

/// Reverse lookup from byte to digit value. `u8::MAX` marks bytes outside the alphabet.
const DIGIT_VALUES: [u8; 256] = {
    let mut table = [u8::MAX; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Errors produced by the base-91 codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base91Error {
    /// A character is not part of the alphabet.
    InvalidDigit {
        /// The offending character.
        character: char,
        /// Its character position in the input.
        position: usize,
    },
    /// A value handed to the encoder is not a two-digit code.
    PairOutOfRange {
        /// The rejected value.
        value: u8,
    },
}

impl std::fmt::Display for Base91Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDigit {
                character,
                position,
            } => write!(f, "invalid base-91 digit {:?} at {}", character, position),
            Self::PairOutOfRange { value } => {
                write!(f, "digit pair {} is not in 0..100", value)
            },
        }
    }
}

impl std::error::Error for Base91Error {}

impl From<Base91Error> for ReplayError {
    fn from(err: Base91Error) -> Self {
        match err {
            Base91Error::InvalidDigit {
                character,
                position,
            } => Self::InvalidDigit {
                character,
                position,
            },
            Base91Error::PairOutOfRange { value } => Self::MalformedPayload {
                line: 0,
                reason: MalformedReason::OutOfRange {
                    field: "digit pair",
                    value: i64::from(value),
                },
            },
        }
    }
}

/// An arbitrary-size non-negative integer stored as base-100 limbs.
///
/// Limbs are little-endian (least significant first). An integer decoded from an empty string
/// has no limbs; any other integer has at least one and no leading zero limbs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackedInteger {
    limbs: Vec<u8>,
}

impl PackedInteger {
    /// Returns true if this integer was decoded from empty input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Number of two-digit groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limbs.len()
    }

    fn mul_add(&mut self, factor: u32, addend: u32) {
        let mut carry = addend;
        for limb in &mut self.limbs {
            let v = u32::from(*limb) * factor + carry;
            *limb = (v % LIMB) as u8;
            carry = v / LIMB;
        }
        while carry > 0 {
            self.limbs.push((carry % LIMB) as u8);
            carry /= LIMB;
        }
    }

    fn normalize(&mut self) {
        while self.limbs.len() > 1 && self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
        if self.limbs.is_empty() {
            self.limbs.push(0);
        }
    }
}

/// Decodes `text` as a base-91 big integer.
///
/// # Errors
///
/// Returns [`Base91Error::InvalidDigit`] for the first character outside [`ALPHABET`].
pub fn decode_base91(text: &str) -> Result<PackedInteger, Base91Error> {
    let mut value = PackedInteger::default();
    if text.is_empty() {
        return Ok(value);
    }
    for (position, character) in text.chars().enumerate() {
        let digit = u8::try_from(character)
            .ok()
            .map(|byte| DIGIT_VALUES[usize::from(byte)])
            .filter(|&d| d != u8::MAX)
            .ok_or(Base91Error::InvalidDigit {
                character,
                position,
            })?;
        value.mul_add(BASE, u32::from(digit));
    }
    value.normalize();
    Ok(value)
}

/// Splits a packed integer into its two-digit groups, most significant first.
///
/// The leading group may be a single digit. Empty input yields an empty sequence.
#[must_use]
pub fn unpack_digit_pairs(value: &PackedInteger) -> Vec<u8> {
    value.limbs.iter().rev().copied().collect()
}

/// Decodes and unpacks in one step.
///
/// # Errors
///
/// See [`decode_base91`].
pub fn decode_worker_list(text: &str) -> Result<Vec<u8>, Base91Error> {
    decode_base91(text).map(|value| unpack_digit_pairs(&value))
}

/// Packs a sequence of two-digit codes and writes it in base 91. The inverse of
/// [`decode_worker_list`] for sequences without a leading `0`.
///
/// # Errors
///
/// Returns [`Base91Error::PairOutOfRange`] if any code is 100 or more.
pub fn encode_base91(pairs: &[u8]) -> Result<String, Base91Error> {
    if let Some(&value) = pairs.iter().find(|&&p| u32::from(p) >= LIMB) {
        return Err(Base91Error::PairOutOfRange { value });
    }
    if pairs.is_empty() {
        return Ok(String::new());
    }

    // Big-endian base-100 digits, divided repeatedly by 91.
    let mut digits: Vec<u8> = pairs.to_vec();
    let mut out = Vec::new();
    while digits.iter().any(|&d| d != 0) {
        let mut remainder = 0u32;
        for digit in &mut digits {
            let acc = remainder * LIMB + u32::from(*digit);
            *digit = (acc / BASE) as u8;
            remainder = acc % BASE;
        }
        out.push(ALPHABET[remainder as usize]);
        let leading_zeros = digits.iter().take_while(|&&d| d == 0).count();
        digits.drain(..leading_zeros);
    }
    if out.is_empty() {
        out.push(ALPHABET[0]);
    }
    out.reverse();
    Ok(out.into_iter().map(char::from).collect())
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
    fn alphabet_has_unique_characters() {
        let mut seen = std::collections::HashSet::new();
        for &c in ALPHABET {
            assert!(seen.insert(c), "duplicate {}", char::from(c));
        }
        assert_eq!(seen.len(), 91);
    }

    #[test]
    fn single_digits() {
        assert_eq!(decode_worker_list("0").unwrap(), vec![0]);
        assert_eq!(decode_worker_list("9").unwrap(), vec![9]);
        assert_eq!(decode_worker_list("A").unwrap(), vec![16]);
        assert_eq!(decode_worker_list("/").unwrap(), vec![90]);
    }

    #[test]
    fn two_characters() {
        // 3 * 91 + 34 = 307 -> "3" "07"
        assert_eq!(decode_worker_list("3S").unwrap(), vec![3, 7]);
        // 1 * 91 + 9 = 100 -> "1" "00"
        assert_eq!(decode_worker_list("19").unwrap(), vec![1, 0]);
    }

    #[test]
    fn empty_input_is_empty_sequence() {
        let value = decode_base91("").unwrap();
        assert!(value.is_empty());
        assert!(unpack_digit_pairs(&value).is_empty());
    }

    #[test]
    fn leading_zero_digits_do_not_add_groups() {
        assert_eq!(decode_worker_list("00003S").unwrap(), vec![3, 7]);
        assert_eq!(decode_worker_list("000").unwrap(), vec![0]);
    }

    #[test]
    fn invalid_digit_reports_position() {
        let err = decode_base91("3S'x").unwrap_err();
        assert_eq!(
            err,
            Base91Error::InvalidDigit {
                character: '\'',
                position: 2
            }
        );
        let err = decode_base91("é").unwrap_err();
        assert!(matches!(err, Base91Error::InvalidDigit { position: 0, .. }));
    }

    #[test]
    fn invalid_digit_converts_to_replay_error() {
        let err: ReplayError = decode_base91(" ").unwrap_err().into();
        assert!(matches!(
            err,
            ReplayError::InvalidDigit {
                character: ' ',
                position: 0
            }
        ));
    }

    #[test]
    fn encode_known_values() {
        assert_eq!(encode_base91(&[3, 7]).unwrap(), "3S");
        assert_eq!(encode_base91(&[0]).unwrap(), "0");
        assert_eq!(encode_base91(&[]).unwrap(), "");
        assert_eq!(
            encode_base91(&[100]).unwrap_err(),
            Base91Error::PairOutOfRange { value: 100 }
        );
    }

    #[test]
    fn long_passenger_lists_round_trip() {
        let workers: Vec<u8> = vec![12, 0, 99, 5, 5, 5, 37, 1, 0, 0];
        let text = encode_base91(&workers).unwrap();
        assert_eq!(decode_worker_list(&text).unwrap(), workers);
    }
}
