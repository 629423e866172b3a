//! Transport encoding of frame payloads: zlib-compressed text wrapped in standard base64.
//!
//! ```
//! use selenia_replay::codec::payload::{compress_payload, decompress_payload};
//!
//! let wire = compress_payload("0\n0\n0").unwrap();
//! assert_eq!(decompress_payload(&wire).unwrap(), "0\n0\n0");
//! ```

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{DecompressionStage, ReplayError};

/// Recovers the plaintext record from a transport payload.
///
/// Surrounding whitespace (a trailing newline from the host, for instance) is ignored.
///
/// # Errors
///
/// Returns [`ReplayError::Decompression`] naming the stage that failed.
pub fn decompress_payload(payload: &str) -> Result<String, ReplayError> {
    let compressed = STANDARD
        .decode(payload.trim())
        .map_err(|e| ReplayError::Decompression {
            stage: DecompressionStage::Base64,
            message: e.to_string(),
        })?;

    let mut inflated = Vec::with_capacity(compressed.len() * 4);
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| ReplayError::Decompression {
            stage: DecompressionStage::Inflate,
            message: e.to_string(),
        })?;

    String::from_utf8(inflated).map_err(|e| ReplayError::Decompression {
        stage: DecompressionStage::Utf8,
        message: e.to_string(),
    })
}

/// Produces a transport payload from a plaintext record. The inverse of
/// [`decompress_payload`], used for fixtures and recording tools.
///
/// # Errors
///
/// Returns [`ReplayError::Decompression`] with [`DecompressionStage::Deflate`] if the encoder
/// fails.
pub fn compress_payload(plaintext: &str) -> Result<String, ReplayError> {
    let deflate_err = |e: std::io::Error| ReplayError::Decompression {
        stage: DecompressionStage::Deflate,
        message: e.to_string(),
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(plaintext.as_bytes())
        .map_err(deflate_err)?;
    let compressed = encoder.finish().map_err(deflate_err)?;
    Ok(STANDARD.encode(compressed))
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
    fn compress_then_decompress() {
        let text = "1\n0\n120\n2\n4 1 10 20\n5 3 40 50\n300\n0";
        let wire = compress_payload(text).unwrap();
        assert!(wire.is_ascii());
        assert_eq!(decompress_payload(&wire).unwrap(), text);
    }

    #[test]
    fn trailing_newline_is_ignored() {
        let wire = format!("{}\n", compress_payload("abc").unwrap());
        assert_eq!(decompress_payload(&wire).unwrap(), "abc");
    }

    #[test]
    fn invalid_base64_fails_in_base64_stage() {
        let err = decompress_payload("not base64 !!").unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Decompression {
                stage: DecompressionStage::Base64,
                ..
            }
        ));
    }

    #[test]
    fn valid_base64_but_not_zlib_fails_in_inflate_stage() {
        let wire = STANDARD.encode(b"plain bytes, no zlib header");
        let err = decompress_payload(&wire).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Decompression {
                stage: DecompressionStage::Inflate,
                ..
            }
        ));
    }

    #[test]
    fn non_utf8_plaintext_fails_in_utf8_stage() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let wire = STANDARD.encode(encoder.finish().unwrap());
        let err = decompress_payload(&wire).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Decompression {
                stage: DecompressionStage::Utf8,
                ..
            }
        ));
    }
}
