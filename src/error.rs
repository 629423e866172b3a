use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::city::TubeKey;
use crate::BuildingId;

/// This enum contains all errors this library can return. Most API functions return a
/// [`Result<T, ReplayError>`].
///
/// [`Result<T, ReplayError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ReplayError {
    /// A required field of a delta or global record is missing or not parseable.
    /// The whole record is unusable.
    MalformedPayload {
        /// Zero-based line index in the plaintext record where decoding stopped.
        line: usize,
        /// Why the field could not be decoded.
        reason: MalformedReason,
    },
    /// A base-91 string contained a character outside the alphabet.
    InvalidDigit {
        /// The offending character.
        character: char,
        /// Its character position in the input.
        position: usize,
    },
    /// The transport encoding (base64 + zlib) could not be reversed.
    Decompression {
        /// Which stage failed.
        stage: DecompressionStage,
        /// The underlying library message.
        message: String,
    },
    /// A back-reference pointed outside the event cache and the session is configured to fail
    /// on cache misses.
    CacheMiss {
        /// The requested index, as written on the wire.
        index: i64,
        /// The cache length at the time of the lookup.
        len: usize,
    },
    /// An event referenced a building that was never introduced.
    UnknownBuilding {
        /// The missing building.
        building: BuildingId,
        /// What was being applied when the reference was resolved.
        context: &'static str,
    },
    /// A tube upgrade referenced a pair with no tube.
    UnknownTube {
        /// The normalized pair.
        key: TubeKey,
    },
    /// Frames must be handed over in strictly increasing sequence order.
    OutOfOrderFrame {
        /// Sequence number of the last accumulated frame.
        previous: u32,
        /// Sequence number that was received.
        received: u32,
    },
    /// A frame duration must be finite and positive to rescale event times.
    InvalidFrameDuration {
        /// The rejected duration.
        duration: f64,
    },
    /// A configuration value is out of range.
    InvalidConfig {
        /// Further specifies what was invalid.
        info: String,
    },
    /// Snapshot serialization or deserialization failed.
    Serialization {
        /// A description of what failed.
        context: String,
    },
}

impl Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPayload { line, reason } => {
                write!(f, "Malformed payload at line {}: {}", line, reason)
            },
            Self::InvalidDigit {
                character,
                position,
            } => {
                write!(
                    f,
                    "Invalid base-91 digit {:?} at position {}",
                    character, position
                )
            },
            Self::Decompression { stage, message } => {
                write!(f, "Payload decompression failed during {}: {}", stage, message)
            },
            Self::CacheMiss { index, len } => {
                write!(
                    f,
                    "Event cache back-reference {} is out of range (cache holds {} events)",
                    index, len
                )
            },
            Self::UnknownBuilding { building, context } => {
                write!(f, "Unknown building {} while applying {}", building, context)
            },
            Self::UnknownTube { key } => {
                write!(f, "No tube between buildings {}", key)
            },
            Self::OutOfOrderFrame { previous, received } => {
                write!(
                    f,
                    "Frame {} received after frame {}; frames must arrive in turn order",
                    received, previous
                )
            },
            Self::InvalidFrameDuration { duration } => {
                write!(f, "Invalid frame duration {}: must be finite and positive", duration)
            },
            Self::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            Self::Serialization { context } => {
                write!(f, "Serialization error: {}", context)
            },
        }
    }
}

impl Error for ReplayError {}

/// Why a record field could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MalformedReason {
    /// The record ended before this field.
    MissingField {
        /// Name of the expected field.
        field: &'static str,
    },
    /// The field was present but is not an integer.
    NotANumber {
        /// Name of the field.
        field: &'static str,
        /// The raw token.
        token: String,
    },
    /// The field is a number but outside the range its type allows.
    OutOfRange {
        /// Name of the field.
        field: &'static str,
        /// The parsed value.
        value: i64,
    },
    /// An event line carried a type code with no known meaning.
    UnknownEventType {
        /// The wire code.
        code: i64,
    },
    /// A packed worker list was not valid base-91.
    InvalidBase91 {
        /// The offending character.
        character: char,
    },
    /// A record left unconsumed tokens on its final line.
    TrailingTokens {
        /// Name of the record.
        record: &'static str,
        /// How many tokens were left.
        count: usize,
    },
}

impl Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field `{}`", field),
            Self::NotANumber { field, token } => {
                write!(f, "field `{}` is not a number: {:?}", field, token)
            },
            Self::OutOfRange { field, value } => {
                write!(f, "field `{}` is out of range: {}", field, value)
            },
            Self::UnknownEventType { code } => write!(f, "unknown event type {}", code),
            Self::InvalidBase91 { character } => {
                write!(f, "invalid base-91 character {:?} in worker list", character)
            },
            Self::TrailingTokens { record, count } => {
                write!(f, "{} trailing token(s) after {} record", count, record)
            },
        }
    }
}

/// The transport-decoding stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecompressionStage {
    /// Base64 text decoding.
    Base64,
    /// zlib inflation.
    Inflate,
    /// The inflated bytes were not UTF-8.
    Utf8,
    /// zlib deflation (only when producing payloads).
    Deflate,
}

impl Display for DecompressionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => write!(f, "base64 decoding"),
            Self::Inflate => write!(f, "inflating"),
            Self::Utf8 => write!(f, "utf-8 decoding"),
            Self::Deflate => write!(f, "deflating"),
        }
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
    fn malformed_payload_display_names_line_and_field() {
        let err = ReplayError::MalformedPayload {
            line: 3,
            reason: MalformedReason::NotANumber {
                field: "score",
                token: "abc".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("score"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn unknown_tube_display_uses_normalized_key() {
        let err = ReplayError::UnknownTube {
            key: TubeKey::new(BuildingId::new(9), BuildingId::new(2)),
        };
        assert!(err.to_string().contains("2-9"));
    }

    #[test]
    fn decompression_display() {
        let err = ReplayError::Decompression {
            stage: DecompressionStage::Inflate,
            message: "corrupt deflate stream".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("inflating"));
        assert!(msg.contains("corrupt"));
    }

    #[test]
    fn errors_compare_structurally() {
        let a = ReplayError::CacheMiss { index: 5, len: 2 };
        let b = ReplayError::CacheMiss { index: 5, len: 2 };
        let c = ReplayError::CacheMiss { index: 6, len: 2 };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
