//! JPEG Baseline (Process 1), transfer syntax 1.2.840.10008.1.2.4.50.
//!
//! Thin wrapper over `jpeg-decoder`/`jpeg-encoder`: baseline DCT JPEG is
//! a well-trodden format with mature pure-Rust implementations, so unlike
//! RLE and JPEG Lossless this codec delegates the bitstream work instead
//! of re-implementing it.

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use snafu::ensure;

use crate::codec::{
    ChromaSubsampling, CompressionOptions, DecodingFailedSnafu, EncodingFailedSnafu,
    InvalidParametersSnafu, Result,
};
use crate::image_params::ImageParams;
use crate::Codec;

pub const TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.50";

/// JPEG Baseline (Process 1) codec, backed by `jpeg-decoder`/`jpeg-encoder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegBaselineCodec;

impl Codec for JpegBaselineCodec {
    fn transfer_syntax_uid(&self) -> &'static str {
        TRANSFER_SYNTAX_UID
    }

    fn name(&self) -> &'static str {
        "JPEG Baseline (Process 1)"
    }

    fn is_lossy(&self) -> bool {
        true
    }

    fn can_encode(&self, params: &ImageParams) -> bool {
        params.valid_for_jpeg_baseline()
    }

    fn can_decode(&self, params: &ImageParams) -> bool {
        params.bits_allocated == 0 || params.valid_for_jpeg_baseline()
    }

    fn encode(&self, pixel_data: &[u8], params: &ImageParams, options: &CompressionOptions) -> Result<Vec<u8>> {
        ensure!(
            !pixel_data.is_empty(),
            EncodingFailedSnafu { reason: "empty pixel data" }
        );
        ensure!(
            params.valid_for_jpeg_baseline(),
            InvalidParametersSnafu {
                codec: "JPEG Baseline",
                reason: "requires 8-bit allocation, 1 or 3 samples per pixel",
            }
        );
        let expected = params.frame_size_bytes();
        ensure!(
            pixel_data.len() == expected,
            EncodingFailedSnafu {
                reason: format!("pixel data size mismatch: expected {expected}, got {}", pixel_data.len()),
            }
        );

        let color_type = if params.samples_per_pixel == 1 { ColorType::Luma } else { ColorType::Rgb };
        let mut output = Vec::new();
        let mut encoder = Encoder::new(&mut output, options.quality.clamp(1, 100));
        if options.progressive {
            encoder.set_progressive(true);
        }
        if params.samples_per_pixel > 1 {
            let sampling_factor = match options.chroma_subsampling {
                ChromaSubsampling::None => SamplingFactor::R_4_4_4,
                ChromaSubsampling::Horizontal => SamplingFactor::R_4_2_2,
                ChromaSubsampling::Both => SamplingFactor::R_4_2_0,
            };
            encoder.set_sampling_factor(sampling_factor);
        }
        encoder
            .encode(pixel_data, params.width, params.height, color_type)
            .map_err(|source| crate::codec::CodecError::EncodingFailed {
                reason: source.to_string(),
                backtrace: snafu::Backtrace::capture(),
            })?;
        Ok(output)
    }

    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        ensure!(
            !compressed.is_empty(),
            DecodingFailedSnafu { reason: "empty compressed data" }
        );
        let mut decoder = jpeg_decoder::Decoder::new(compressed);
        let pixels = decoder.decode().map_err(|source| crate::codec::CodecError::DecodingFailed {
            reason: source.to_string(),
            backtrace: snafu::Backtrace::capture(),
        })?;
        let info = decoder.info().ok_or_else(|| crate::codec::CodecError::DecodingFailed {
            reason: "decoder produced no frame info".to_string(),
            backtrace: snafu::Backtrace::capture(),
        })?;
        if params.width > 0 {
            ensure!(
                info.width == params.width,
                DecodingFailedSnafu { reason: "width mismatch against declared image parameters" }
            );
        }
        if params.height > 0 {
            ensure!(
                info.height == params.height,
                DecodingFailedSnafu { reason: "height mismatch against declared image parameters" }
            );
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_params::PhotometricInterpretation;

    fn grayscale(width: u16, height: u16) -> ImageParams {
        ImageParams {
            width,
            height,
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            samples_per_pixel: 1,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Monochrome2,
            number_of_frames: 1,
        }
    }

    #[test]
    fn round_trips_within_lossy_tolerance() {
        let params = grayscale(16, 16);
        let pixel_data: Vec<u8> = (0..256u16).map(|v| v as u8).collect();
        let codec = JpegBaselineCodec;
        let options = CompressionOptions { quality: 95, ..Default::default() };
        let encoded = codec.encode(&pixel_data, &params, &options).expect("encode");
        let decoded = codec.decode(&encoded, &params).expect("decode");
        assert_eq!(decoded.len(), pixel_data.len());
    }

    #[test]
    fn rejects_16bit_input() {
        let params = ImageParams { bits_allocated: 16, bits_stored: 16, ..grayscale(4, 4) };
        assert!(!params.valid_for_jpeg_baseline());
    }
}
