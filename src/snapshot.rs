//! Binary snapshots of cumulative frames.
//!
//! A renderer running in another process receives frames as bytes. The encoding is bincode with
//! fixed-size integers. The link to the previous frame is not part of a snapshot, so a decoded
//! frame is its own predecessor.
//!
//! ```
//! use selenia_replay::{snapshot, ReplayBuilder, FrameInfo};
//!
//! # fn main() -> Result<(), selenia_replay::ReplayError> {
//! let mut session = ReplayBuilder::new().start_plaintext("0\n0\n100\n100\n0\n-1\n1\n1 0 10 10\n0")?;
//! let frame = session.handle_frame_plaintext(FrameInfo::new(0, 1000.0, 0.0), "0\n0\n0")?;
//!
//! let bytes = snapshot::encode(&frame)?;
//! let decoded = snapshot::decode(&bytes)?;
//! assert_eq!(decoded, *frame);
//! assert!(!decoded.has_previous());
//! # Ok(())
//! # }
//! ```

use crate::error::ReplayError;
use crate::frame::CumulativeFrame;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Serializes a frame.
///
/// # Errors
///
/// Returns [`ReplayError::Serialization`] if bincode rejects the frame.
pub fn encode(frame: &CumulativeFrame) -> Result<Vec<u8>, ReplayError> {
    bincode::serde::encode_to_vec(frame, config()).map_err(|e| ReplayError::Serialization {
        context: format!("encoding frame {}: {}", frame.info.number, e),
    })
}

/// Deserializes a frame produced by [`encode`].
///
/// # Errors
///
/// Returns [`ReplayError::Serialization`] if the bytes are not a complete frame.
pub fn decode(bytes: &[u8]) -> Result<CumulativeFrame, ReplayError> {
    let (frame, read): (CumulativeFrame, usize) =
        bincode::serde::decode_from_slice(bytes, config()).map_err(|e| {
            ReplayError::Serialization {
                context: format!("decoding frame: {}", e),
            }
        })?;
    if read != bytes.len() {
        return Err(ReplayError::Serialization {
            context: format!("{} trailing bytes after frame", bytes.len() - read),
        });
    }
    Ok(frame)
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
    use crate::config::ReplayConfig;
    use crate::session::ReplayBuilder;
    use crate::frame::FrameInfo;

    fn busy_frame() -> std::sync::Arc<CumulativeFrame> {
        let global = "0\n0\n100\n100\n0\n-1\n3\n1 0 10 10\n2 3 50 50\n3 4 90 20\n0";
        let mut session = ReplayBuilder::new()
            .with_config(ReplayConfig::deterministic(9))
            .start_plaintext(global)
            .unwrap();
        session
            .handle_frame_plaintext(
                FrameInfo::new(0, 1000.0, 0.0),
                "0\n0\n4\n0 0 10 1 2\n5 0 600 1 0 0 1\n2 600 900 1 2 5 3S\n3 100 300 2 3 20 50 7 2",
            )
            .unwrap();
        session
            .handle_frame_plaintext(FrameInfo::new(1, 1000.0, 0.0), "0\n1\n12\n80\n0")
            .unwrap()
    }

    #[test]
    fn frames_survive_a_round_trip() {
        let frame = busy_frame();
        let bytes = encode(&frame).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, *frame);
        assert!(frame.has_previous());
        assert!(!decoded.has_previous());
    }

    #[test]
    fn truncated_and_padded_input_is_rejected() {
        let bytes = encode(&busy_frame()).unwrap();
        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, ReplayError::Serialization { .. }));

        let mut padded = bytes;
        padded.push(0);
        let err = decode(&padded).unwrap_err();
        assert!(matches!(err, ReplayError::Serialization { .. }));
    }
}
