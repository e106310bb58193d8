//! JPEG-LS (ITU-T T.87), transfer syntaxes 1.2.840.10008.1.2.4.80
//! (lossless) and .81 (near-lossless).
//!
//! Wraps the `charls` bindings to the reference CharLS implementation.
//! Only decoding is wired up, matching how this binding is used
//! elsewhere in the ecosystem: CharLS's Rust bindings expose a decode
//! path but no public encoder, so a caller asking this codec to compress
//! gets a clear `EncodingFailed` rather than a silent no-op.

use charls::CharLS;
use snafu::ensure;
use tracing::debug;

use crate::codec::{CodecError, CompressionOptions, DecodingFailedSnafu, EncodingFailedSnafu, InvalidParametersSnafu, Result};
use crate::image_params::ImageParams;
use crate::Codec;

pub const LOSSLESS_TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.80";
pub const NEAR_LOSSLESS_TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.81";

const MAX_NEAR_VALUE: u8 = 10;

/// Maps a 1-100 quality setting to a JPEG-LS NEAR parameter: 100 is
/// lossless (NEAR=0), lower quality allows a larger per-sample error
/// bound.
fn near_from_quality(quality: u8) -> u8 {
    let quality = quality.clamp(1, 100) as u32;
    (((100 - quality) * 10) / 100).min(MAX_NEAR_VALUE as u32) as u8
}

/// JPEG-LS codec (ITU-T T.87), backed by `charls`.
#[derive(Debug, Clone, Copy)]
pub struct JpegLsCodec {
    near_lossless: bool,
}

impl JpegLsCodec {
    /// The lossless transfer syntax (1.2.840.10008.1.2.4.80).
    pub fn lossless() -> Self {
        JpegLsCodec { near_lossless: false }
    }

    /// The near-lossless transfer syntax (1.2.840.10008.1.2.4.81).
    pub fn near_lossless() -> Self {
        JpegLsCodec { near_lossless: true }
    }
}

impl Codec for JpegLsCodec {
    fn transfer_syntax_uid(&self) -> &'static str {
        if self.near_lossless {
            NEAR_LOSSLESS_TRANSFER_SYNTAX_UID
        } else {
            LOSSLESS_TRANSFER_SYNTAX_UID
        }
    }

    fn name(&self) -> &'static str {
        if self.near_lossless {
            "JPEG-LS Lossy (Near-Lossless) Image Compression"
        } else {
            "JPEG-LS Lossless Image Compression"
        }
    }

    fn is_lossy(&self) -> bool {
        self.near_lossless
    }

    fn can_encode(&self, _params: &ImageParams) -> bool {
        // charls only exposes a decoder; see `encode` below.
        false
    }

    fn can_decode(&self, params: &ImageParams) -> bool {
        params.bits_allocated == 0 || params.valid_for_jpeg_ls()
    }

    fn encode(&self, pixel_data: &[u8], params: &ImageParams, options: &CompressionOptions) -> Result<Vec<u8>> {
        ensure!(
            !pixel_data.is_empty(),
            EncodingFailedSnafu { reason: "empty pixel data" }
        );
        ensure!(
            params.valid_for_jpeg_ls(),
            InvalidParametersSnafu {
                codec: "JPEG-LS",
                reason: "requires 8/16-bit allocation, 2-16 bit precision, 1 or 3 samples per pixel",
            }
        );
        let near = if !self.near_lossless || options.lossless { 0 } else { near_from_quality(options.quality) };
        debug!(near, "JPEG-LS encode requested but charls exposes no encoder");
        Err(CodecError::EncodingFailed {
            reason: "JPEG-LS encoding is not available: the charls bindings only expose decoding".to_string(),
            backtrace: snafu::Backtrace::capture(),
        })
    }

    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        ensure!(
            !compressed.is_empty(),
            DecodingFailedSnafu { reason: "empty compressed data" }
        );
        let decoded = CharLS::default()
            .decode(compressed, 0)
            .map_err(|source| CodecError::DecodingFailed {
                reason: source.to_string(),
                backtrace: snafu::Backtrace::capture(),
            })?;
        let expected = params.frame_size_bytes();
        if expected != 0 {
            ensure!(
                decoded.len() == expected,
                DecodingFailedSnafu {
                    reason: format!("decoded size mismatch: expected {expected}, got {}", decoded.len()),
                }
            );
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_lossless_quality_100_maps_to_near_0() {
        assert_eq!(near_from_quality(100), 0);
    }

    #[test]
    fn near_lossless_quality_1_maps_to_near_near_max() {
        assert_eq!(near_from_quality(1), 9);
    }

    #[test]
    fn lossless_codec_uses_lossless_transfer_syntax() {
        let codec = JpegLsCodec::lossless();
        assert_eq!(codec.transfer_syntax_uid(), LOSSLESS_TRANSFER_SYNTAX_UID);
        assert!(!codec.is_lossy());
    }
}
