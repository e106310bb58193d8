//! RLE Lossless (DICOM PS3.5 Annex G), transfer syntax 1.2.840.10008.1.2.5.
//!
//! Each sample plane of a frame is encoded as its own PackBits segment;
//! a 64-byte header (a segment count followed by fifteen little-endian
//! u32 offsets) lets a decoder locate each segment without scanning.
//! 16-bit samples are split into separate high-byte and low-byte
//! segments, so a grayscale frame uses 1 (8-bit) or 2 (16-bit) segments
//! and an RGB frame uses 3 or 6.

use snafu::ensure;

use crate::codec::{
    CompressionOptions, DecodingFailedSnafu, EncodingFailedSnafu, InvalidParametersSnafu, Result,
};
use crate::image_params::ImageParams;
use crate::Codec;

pub const TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.5";
const MAX_SEGMENTS: usize = 15;
const HEADER_SIZE: usize = 64;

/// RLE Lossless codec (DICOM PS3.5 Annex G).
#[derive(Debug, Default, Clone, Copy)]
pub struct RleCodec;

impl Codec for RleCodec {
    fn transfer_syntax_uid(&self) -> &'static str {
        TRANSFER_SYNTAX_UID
    }

    fn name(&self) -> &'static str {
        "RLE Lossless"
    }

    fn is_lossy(&self) -> bool {
        false
    }

    fn can_encode(&self, params: &ImageParams) -> bool {
        params.valid_for_rle()
    }

    fn can_decode(&self, params: &ImageParams) -> bool {
        (params.bits_allocated == 0 || params.bits_allocated == 8 || params.bits_allocated == 16)
            && (params.samples_per_pixel == 0
                || (1..=3).contains(&params.samples_per_pixel))
    }

    fn encode(&self, pixel_data: &[u8], params: &ImageParams, _options: &CompressionOptions) -> Result<Vec<u8>> {
        ensure!(
            !pixel_data.is_empty(),
            EncodingFailedSnafu { reason: "empty pixel data" }
        );
        ensure!(
            params.valid_for_rle(),
            InvalidParametersSnafu {
                codec: "RLE Lossless",
                reason: "requires 8/16-bit allocation, 1-3 samples per pixel, at most 15 segments",
            }
        );
        let expected = params.frame_size_bytes();
        ensure!(
            pixel_data.len() == expected,
            EncodingFailedSnafu {
                reason: format!("pixel data size mismatch: expected {expected}, got {}", pixel_data.len()),
            }
        );
        Ok(encode_frame(pixel_data, params))
    }

    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        ensure!(
            !compressed.is_empty(),
            DecodingFailedSnafu { reason: "empty compressed data" }
        );
        ensure!(
            compressed.len() >= HEADER_SIZE,
            DecodingFailedSnafu { reason: "compressed data too small for RLE header" }
        );
        decode_frame(compressed, params)
    }
}

fn encode_rle_segment(input: &[u8], output: &mut Vec<u8>) {
    let mut pos = 0usize;
    let size = input.len();
    while pos < size {
        let current = input[pos];
        let mut run_length = 1usize;
        while pos + run_length < size && input[pos + run_length] == current && run_length < 128 {
            run_length += 1;
        }

        if run_length >= 3 {
            output.push((1i32 - run_length as i32) as u8);
            output.push(current);
            pos += run_length;
        } else {
            let mut literal = Vec::with_capacity(128);
            while pos < size && literal.len() < 128 {
                let mut ahead_run = 1usize;
                while pos + ahead_run < size && input[pos + ahead_run] == input[pos] && ahead_run < 3 {
                    ahead_run += 1;
                }
                if ahead_run >= 3 {
                    break;
                }
                literal.push(input[pos]);
                pos += 1;
            }
            if !literal.is_empty() {
                output.push((literal.len() - 1) as u8);
                output.extend_from_slice(&literal);
            }
        }
    }
}

fn decode_rle_segment(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size);
    let mut pos = 0usize;
    let size = input.len();

    while pos < size && output.len() < expected_size {
        let control = input[pos] as i8;
        pos += 1;

        if control >= 0 {
            let count = control as usize + 1;
            ensure!(
                pos + count <= size,
                DecodingFailedSnafu { reason: "insufficient literal data in RLE segment" }
            );
            output.extend_from_slice(&input[pos..pos + count]);
            pos += count;
        } else if control != -128 {
            ensure!(
                pos < size,
                DecodingFailedSnafu { reason: "missing replicate byte in RLE segment" }
            );
            let count = (1 - control as i32) as usize;
            let value = input[pos];
            pos += 1;
            for _ in 0..count {
                if output.len() >= expected_size {
                    break;
                }
                output.push(value);
            }
        }
        // control == -128 is a no-op.
    }

    Ok(output)
}

fn encode_frame(pixel_data: &[u8], params: &ImageParams) -> Vec<u8> {
    let num_segments = params.segment_count();
    let pixels_per_frame = params.width as usize * params.height as usize;
    let bytes_per_sample = params.bytes_per_sample();
    let samples = params.samples_per_pixel as usize;

    let mut segments = vec![Vec::with_capacity(pixels_per_frame); num_segments];

    if bytes_per_sample == 1 {
        if samples == 1 {
            segments[0].extend_from_slice(pixel_data);
        } else {
            for i in 0..pixels_per_frame {
                for s in 0..samples {
                    segments[s].push(pixel_data[i * samples + s]);
                }
            }
        }
    } else if samples == 1 {
        for i in 0..pixels_per_frame {
            let idx = i * 2;
            segments[0].push(pixel_data[idx + 1]); // high byte
            segments[1].push(pixel_data[idx]); // low byte
        }
    } else {
        for i in 0..pixels_per_frame {
            for s in 0..samples {
                let idx = (i * samples + s) * 2;
                segments[s * 2].push(pixel_data[idx + 1]);
                segments[s * 2 + 1].push(pixel_data[idx]);
            }
        }
    }

    let encoded_segments: Vec<Vec<u8>> = segments
        .iter()
        .map(|seg| {
            let mut out = Vec::new();
            encode_rle_segment(seg, &mut out);
            out
        })
        .collect();

    let mut output = vec![0u8; HEADER_SIZE];
    output[0..4].copy_from_slice(&(num_segments as u32).to_le_bytes());

    let mut current_offset = HEADER_SIZE as u32;
    for (i, seg) in encoded_segments.iter().enumerate() {
        output[4 + i * 4..8 + i * 4].copy_from_slice(&current_offset.to_le_bytes());
        current_offset += seg.len() as u32;
        if seg.len() % 2 != 0 {
            current_offset += 1;
        }
    }

    for seg in &encoded_segments {
        output.extend_from_slice(seg);
        if seg.len() % 2 != 0 {
            output.push(0);
        }
    }

    output
}

fn decode_frame(compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
    let num_segments = u32::from_le_bytes(compressed[0..4].try_into().unwrap()) as usize;
    ensure!(
        num_segments != 0 && num_segments <= MAX_SEGMENTS,
        DecodingFailedSnafu {
            reason: format!("invalid RLE segment count: {num_segments}"),
        }
    );

    let expected_segments = params.segment_count();
    ensure!(
        num_segments == expected_segments,
        DecodingFailedSnafu {
            reason: format!("segment count mismatch: expected {expected_segments}, got {num_segments}"),
        }
    );

    let mut offsets = Vec::with_capacity(num_segments);
    for i in 0..num_segments {
        let offset = u32::from_le_bytes(
            compressed[4 + i * 4..8 + i * 4].try_into().unwrap(),
        );
        ensure!(
            (offset as usize) < compressed.len(),
            DecodingFailedSnafu {
                reason: format!("invalid segment offset: {offset}"),
            }
        );
        offsets.push(offset as usize);
    }

    let mut sizes = Vec::with_capacity(num_segments);
    for i in 0..num_segments {
        let size = if i + 1 < num_segments {
            offsets[i + 1] - offsets[i]
        } else {
            compressed.len() - offsets[i]
        };
        sizes.push(size);
    }

    let pixels_per_frame = params.width as usize * params.height as usize;
    let bytes_per_sample = params.bytes_per_sample();
    let samples = params.samples_per_pixel as usize;

    let mut decoded_segments = Vec::with_capacity(num_segments);
    for i in 0..num_segments {
        let segment_data = &compressed[offsets[i]..offsets[i] + sizes[i]];
        let decoded = decode_rle_segment(segment_data, pixels_per_frame)?;
        ensure!(
            decoded.len() == pixels_per_frame,
            DecodingFailedSnafu {
                reason: format!(
                    "segment {i} decoded size mismatch: expected {pixels_per_frame}, got {}",
                    decoded.len()
                ),
            }
        );
        decoded_segments.push(decoded);
    }

    let output_size = pixels_per_frame * samples * bytes_per_sample;
    let mut output = vec![0u8; output_size];

    if bytes_per_sample == 1 {
        if samples == 1 {
            output.copy_from_slice(&decoded_segments[0]);
        } else {
            for i in 0..pixels_per_frame {
                for s in 0..samples {
                    output[i * samples + s] = decoded_segments[s][i];
                }
            }
        }
    } else if samples == 1 {
        for i in 0..pixels_per_frame {
            let idx = i * 2;
            output[idx] = decoded_segments[1][i];
            output[idx + 1] = decoded_segments[0][i];
        }
    } else {
        for i in 0..pixels_per_frame {
            for s in 0..samples {
                let idx = (i * samples + s) * 2;
                output[idx] = decoded_segments[s * 2 + 1][i];
                output[idx + 1] = decoded_segments[s * 2][i];
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::image_params::PhotometricInterpretation;

    fn grayscale_16bit(width: u16, height: u16) -> ImageParams {
        ImageParams {
            width,
            height,
            bits_allocated: 16,
            bits_stored: 16,
            high_bit: 15,
            samples_per_pixel: 1,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Monochrome2,
            number_of_frames: 1,
        }
    }

    #[test]
    fn round_trips_4x4_16bit_frame() {
        let params = grayscale_16bit(4, 4);
        let values: [u16; 16] = [
            0, 4369, 8738, 13107, 17476, 21845, 26214, 30583, 34952, 39321, 43690, 48059, 52428,
            56797, 61166, 65535,
        ];
        let mut pixel_data = Vec::with_capacity(32);
        for v in values {
            pixel_data.extend_from_slice(&v.to_le_bytes());
        }

        let codec = RleCodec;
        let encoded = codec
            .encode(&pixel_data, &params, &CompressionOptions::default())
            .expect("encode");
        let decoded = codec.decode(&encoded, &params).expect("decode");
        assert_eq!(decoded, pixel_data);
    }

    #[test]
    fn round_trips_rgb_8bit_frame() {
        let params = ImageParams {
            width: 2,
            height: 2,
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            samples_per_pixel: 3,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Rgb,
            number_of_frames: 1,
        };
        let pixel_data: Vec<u8> = (0..12u8).collect();
        let codec = RleCodec;
        let encoded = codec
            .encode(&pixel_data, &params, &CompressionOptions::default())
            .expect("encode");
        let decoded = codec.decode(&encoded, &params).expect("decode");
        assert_eq!(decoded, pixel_data);
    }

    #[test]
    fn rejects_too_many_segments() {
        let params = ImageParams {
            width: 1,
            height: 1,
            bits_allocated: 16,
            bits_stored: 16,
            high_bit: 15,
            samples_per_pixel: 8,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Unknown,
            number_of_frames: 1,
        };
        assert!(!params.valid_for_rle());
        let codec = RleCodec;
        assert!(codec
            .encode(&[0u8; 16], &params, &CompressionOptions::default())
            .is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let codec = RleCodec;
        let params = grayscale_16bit(4, 4);
        let err = codec.decode(&[0u8; 10], &params).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }
}
