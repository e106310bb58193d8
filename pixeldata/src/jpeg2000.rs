//! JPEG 2000, transfer syntaxes 1.2.840.10008.1.2.4.90 (lossless only)
//! and .91 (lossless or lossy).
//!
//! Wraps the `jpeg2k` crate (a Rust port of OpenJPEG). As with the
//! JPEG-LS wrapper, only decoding is implemented: `jpeg2k` does not
//! expose an encoder, so this codec reports encode requests as
//! unsupported rather than faking compression.

use jpeg2k::Image;
use snafu::ensure;
use tracing::{debug, warn};

use crate::codec::{CodecError, CompressionOptions, DecodingFailedSnafu, EncodingFailedSnafu, InvalidParametersSnafu, Result};
use crate::image_params::ImageParams;
use crate::Codec;

pub const LOSSLESS_TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.90";
pub const TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.91";

/// Maps a 1-100 quality setting to the OpenJPEG `tcp_rates[0]` compression
/// ratio parameter: 100 asks for the smallest achievable loss, 1 for the
/// most aggressive compression.
fn compression_ratio_from_quality(quality: u8) -> f32 {
    2.0 + (100.0 - quality.clamp(1, 100) as f32) * 0.98
}

/// JPEG 2000 codec, backed by `jpeg2k`.
#[derive(Debug, Clone, Copy)]
pub struct Jpeg2000Codec {
    lossless_only: bool,
}

impl Jpeg2000Codec {
    /// The lossless-only transfer syntax (1.2.840.10008.1.2.4.90).
    pub fn lossless_only() -> Self {
        Jpeg2000Codec { lossless_only: true }
    }

    /// The general transfer syntax (1.2.840.10008.1.2.4.91), lossy or lossless.
    pub fn general() -> Self {
        Jpeg2000Codec { lossless_only: false }
    }
}

impl Codec for Jpeg2000Codec {
    fn transfer_syntax_uid(&self) -> &'static str {
        if self.lossless_only {
            LOSSLESS_TRANSFER_SYNTAX_UID
        } else {
            TRANSFER_SYNTAX_UID
        }
    }

    fn name(&self) -> &'static str {
        if self.lossless_only {
            "JPEG 2000 Image Compression (Lossless Only)"
        } else {
            "JPEG 2000 Image Compression"
        }
    }

    fn is_lossy(&self) -> bool {
        !self.lossless_only
    }

    fn can_encode(&self, _params: &ImageParams) -> bool {
        // jpeg2k only exposes a decoder; see `encode` below.
        false
    }

    fn can_decode(&self, params: &ImageParams) -> bool {
        params.bits_allocated == 0 || params.valid_for_jpeg2000()
    }

    fn encode(&self, pixel_data: &[u8], params: &ImageParams, options: &CompressionOptions) -> Result<Vec<u8>> {
        ensure!(
            !pixel_data.is_empty(),
            EncodingFailedSnafu { reason: "empty pixel data" }
        );
        ensure!(
            params.valid_for_jpeg2000(),
            InvalidParametersSnafu {
                codec: "JPEG 2000",
                reason: "requires 8/16-bit allocation, 1-16 bit precision, 1 or 3 samples per pixel",
            }
        );
        let use_lossless = self.lossless_only || options.lossless;
        let ratio = if use_lossless { 1.0 } else { compression_ratio_from_quality(options.quality) };
        debug!(ratio, "JPEG 2000 encode requested but jpeg2k exposes no encoder");
        Err(CodecError::EncodingFailed {
            reason: "JPEG 2000 encoding is not available: the jpeg2k bindings only expose decoding".to_string(),
            backtrace: snafu::Backtrace::capture(),
        })
    }

    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        ensure!(
            !compressed.is_empty(),
            DecodingFailedSnafu { reason: "empty compressed data" }
        );
        let image = Image::from_bytes(compressed).map_err(|source| CodecError::DecodingFailed {
            reason: source.to_string(),
            backtrace: snafu::Backtrace::capture(),
        })?;

        let samples_per_pixel = params.samples_per_pixel as usize;
        let bytes_per_sample = params.bytes_per_sample();
        let pixels_per_frame = params.width as usize * params.height as usize;
        let stride = bytes_per_sample * pixels_per_frame;

        let mut output = vec![0u8; samples_per_pixel * stride];
        let components = image.components();
        for (component_i, component) in components.iter().enumerate() {
            if component_i >= samples_per_pixel {
                warn!(component_i, samples_per_pixel, "JPEG 2000 image has more components than expected");
                break;
            }
            for (i, sample) in component.data().iter().enumerate() {
                let offset = i * samples_per_pixel * bytes_per_sample + component_i * bytes_per_sample;
                output[offset..offset + bytes_per_sample]
                    .copy_from_slice(&sample.to_le_bytes()[..bytes_per_sample]);
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_100_maps_to_smallest_ratio() {
        assert!((compression_ratio_from_quality(100) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quality_1_maps_to_largest_ratio() {
        let ratio = compression_ratio_from_quality(1);
        assert!((ratio - (2.0 + 99.0 * 0.98)).abs() < 1e-4);
    }

    #[test]
    fn general_codec_is_lossy() {
        assert!(Jpeg2000Codec::general().is_lossy());
        assert!(!Jpeg2000Codec::lossless_only().is_lossy());
    }
}
