//! JPEG Lossless, Non-Hierarchical, First-Order Prediction (ITU-T T.81
//! Annex H, DICOM PS3.5 Annex A.4.2), transfer syntax
//! 1.2.840.10008.1.2.4.70.
//!
//! Implemented from scratch: a SOF3/DHT/SOS-framed bitstream with one of
//! the seven spatial predictors and a fixed Huffman table over the
//! difference's bit-length category, matching the subset of T.81 that
//! DICOM actually uses (no progressive scans, one component, no
//! arithmetic coding).

use snafu::ensure;

use crate::codec::{CodecError, CompressionOptions, DecodingFailedSnafu, EncodingFailedSnafu, InvalidParametersSnafu, Result};
use crate::image_params::ImageParams;
use crate::Codec;

pub const TRANSFER_SYNTAX_UID: &str = "1.2.840.10008.1.2.4.70";

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOF3: u8 = 0xC3;
const DHT: u8 = 0xC4;
const SOS: u8 = 0xDA;

/// Code lengths (category 0 through 16) for the fixed Huffman table DICOM
/// JPEG Lossless producers use for medical imaging: small differences
/// (the common case) get short codes.
const CODE_LENGTHS: [u8; 17] = [2, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 16];

struct HuffmanTable {
    code_lengths: [u8; 17],
    codes: [u32; 17],
}

impl HuffmanTable {
    fn new() -> Self {
        let mut codes = [0u32; 17];
        let mut code = 0u32;
        let mut last_length = 0u8;
        for i in 0..=16 {
            if CODE_LENGTHS[i] > last_length {
                code <<= CODE_LENGTHS[i] - last_length;
            }
            codes[i] = code;
            code += 1;
            last_length = CODE_LENGTHS[i];
        }
        HuffmanTable { code_lengths: CODE_LENGTHS, codes }
    }
}

struct BitWriter<'a> {
    output: &'a mut Vec<u8>,
    current_byte: u8,
    bit_pos: u32,
}

impl<'a> BitWriter<'a> {
    fn new(output: &'a mut Vec<u8>) -> Self {
        BitWriter { output, current_byte: 0, bit_pos: 0 }
    }

    fn write_bits(&mut self, value: u32, mut num_bits: u32) {
        while num_bits > 0 {
            let bits_to_write = num_bits.min(8 - self.bit_pos);
            let shift = num_bits - bits_to_write;
            let mask = (1u32 << bits_to_write) - 1;
            self.current_byte |=
                (((value >> shift) & mask) << (8 - self.bit_pos - bits_to_write)) as u8;
            self.bit_pos += bits_to_write;
            num_bits -= bits_to_write;
            if self.bit_pos == 8 {
                self.flush_byte();
            }
        }
    }

    fn flush_byte(&mut self) {
        self.output.push(self.current_byte);
        if self.current_byte == 0xFF {
            self.output.push(0x00);
        }
        self.current_byte = 0;
        self.bit_pos = 0;
    }

    fn flush(&mut self) {
        if self.bit_pos > 0 {
            self.flush_byte();
        }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_pos: u32,
    current_byte: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        let current_byte = data.first().copied().unwrap_or(0);
        BitReader { data, pos: 0, bit_pos: 0, current_byte }
    }

    fn advance_byte(&mut self) {
        let previous = self.pos;
        self.pos += 1;
        if self.pos < self.data.len() {
            self.current_byte = self.data[self.pos];
            if self.data[previous] == 0xFF && self.current_byte == 0x00 {
                self.pos += 1;
                if self.pos < self.data.len() {
                    self.current_byte = self.data[self.pos];
                }
            }
        }
        self.bit_pos = 0;
    }

    fn read_bits(&mut self, mut num_bits: u32) -> u32 {
        let mut value = 0u32;
        while num_bits > 0 {
            if self.bit_pos == 8 {
                self.advance_byte();
            }
            let bits_available = 8 - self.bit_pos;
            let bits_to_read = num_bits.min(bits_available);
            let shift = bits_available - bits_to_read;
            let mask = (1u32 << bits_to_read) - 1;
            value = (value << bits_to_read) | ((self.current_byte as u32 >> shift) & mask);
            self.bit_pos += bits_to_read;
            num_bits -= bits_to_read;
        }
        value
    }
}

fn category(diff: i32) -> u32 {
    if diff == 0 {
        return 0;
    }
    let mut abs_diff = diff.unsigned_abs();
    let mut cat = 0;
    while abs_diff > 0 {
        abs_diff >>= 1;
        cat += 1;
    }
    cat
}

fn encode_diff(diff: i32, cat: u32) -> u32 {
    if diff < 0 {
        (diff + (1 << cat) - 1) as u32
    } else {
        diff as u32
    }
}

fn decode_diff(value: u32, cat: u32) -> i32 {
    if cat == 0 {
        return 0;
    }
    let half = 1i32 << (cat - 1);
    let value = value as i32;
    if value < half {
        value - (1 << cat) + 1
    } else {
        value
    }
}

/// One of the seven T.81 Annex H spatial predictors (1-7); the spec's
/// default (and the only one used for the first row/column) is 1 (`Ra`).
fn predict(ra: i32, rb: i32, rc: i32, predictor: u8) -> i32 {
    match predictor {
        1 => ra,
        2 => rb,
        3 => rc,
        4 => ra + rb - rc,
        5 => ra + ((rb - rc) >> 1),
        6 => rb + ((ra - rc) >> 1),
        7 => (ra + rb) >> 1,
        _ => ra,
    }
}

fn write_be16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn read_be16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

/// JPEG Lossless codec with a configurable predictor and point transform
/// (DICOM PS3.5 Annex A.4.2, ITU-T T.81 Annex H).
#[derive(Clone, Copy, Debug)]
pub struct JpegLosslessCodec {
    predictor: u8,
    point_transform: u8,
}

impl Default for JpegLosslessCodec {
    fn default() -> Self {
        JpegLosslessCodec { predictor: 1, point_transform: 0 }
    }
}

impl JpegLosslessCodec {
    pub fn new(predictor: u8, point_transform: u8) -> Self {
        JpegLosslessCodec {
            predictor: predictor.clamp(1, 7),
            point_transform: point_transform.clamp(0, 15),
        }
    }

    pub fn predictor(&self) -> u8 {
        self.predictor
    }

    pub fn point_transform(&self) -> u8 {
        self.point_transform
    }
}

impl Codec for JpegLosslessCodec {
    fn transfer_syntax_uid(&self) -> &'static str {
        TRANSFER_SYNTAX_UID
    }

    fn name(&self) -> &'static str {
        "JPEG Lossless (Process 14, SV1)"
    }

    fn is_lossy(&self) -> bool {
        false
    }

    fn can_encode(&self, params: &ImageParams) -> bool {
        params.valid_for_jpeg_lossless()
    }

    fn can_decode(&self, params: &ImageParams) -> bool {
        (params.bits_allocated == 0 || params.bits_allocated == 8 || params.bits_allocated == 16)
            && (params.samples_per_pixel == 0 || params.samples_per_pixel == 1)
    }

    fn encode(&self, pixel_data: &[u8], params: &ImageParams, _options: &CompressionOptions) -> Result<Vec<u8>> {
        ensure!(
            !pixel_data.is_empty(),
            EncodingFailedSnafu { reason: "empty pixel data" }
        );
        ensure!(
            params.valid_for_jpeg_lossless(),
            InvalidParametersSnafu {
                codec: "JPEG Lossless",
                reason: "requires 8/16-bit allocation, 2-16 bit precision, grayscale",
            }
        );
        let expected = params.frame_size_bytes();
        ensure!(
            pixel_data.len() == expected,
            EncodingFailedSnafu {
                reason: format!("pixel data size mismatch: expected {expected}, got {}", pixel_data.len()),
            }
        );
        Ok(self.encode_frame(pixel_data, params))
    }

    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        ensure!(
            !compressed.is_empty(),
            DecodingFailedSnafu { reason: "empty compressed data" }
        );
        self.decode_frame(compressed, params)
    }
}

impl JpegLosslessCodec {
    fn encode_frame(&self, pixel_data: &[u8], params: &ImageParams) -> Vec<u8> {
        let mut output = Vec::with_capacity(pixel_data.len());
        let precision = params.bits_stored as i32;
        let is_16bit = params.bits_allocated == 16;
        let width = params.width as i32;
        let height = params.height as i32;
        let point_transform = self.point_transform as i32;

        output.push(MARKER_PREFIX);
        output.push(SOI);
        write_sof3(&mut output, params);
        write_dht(&mut output);
        write_sos(&mut output, self.predictor, self.point_transform);

        let ht = HuffmanTable::new();
        let mut writer = BitWriter::new(&mut output);

        let get_pixel = |x: i32, y: i32| -> i32 {
            if x < 0 || y < 0 {
                return 0;
            }
            let mut idx = (y as usize) * params.width as usize + x as usize;
            if is_16bit {
                idx *= 2;
                pixel_data[idx] as i32 | ((pixel_data[idx + 1] as i32) << 8)
            } else {
                pixel_data[idx] as i32
            }
        };

        let mod_range = 1i32 << (precision - point_transform);

        for y in 0..height {
            for x in 0..width {
                let pixel = get_pixel(x, y);
                let ra = get_pixel(x - 1, y);
                let rb = get_pixel(x, y - 1);
                let rc = get_pixel(x - 1, y - 1);

                let shifted_pixel = pixel >> point_transform;
                let pred = if x == 0 && y == 0 {
                    1 << (precision - point_transform - 1)
                } else if y == 0 {
                    ra >> point_transform
                } else if x == 0 {
                    rb >> point_transform
                } else {
                    predict(ra >> point_transform, rb >> point_transform, rc >> point_transform, self.predictor)
                };

                let mut diff = shifted_pixel - pred;
                if diff < -mod_range / 2 {
                    diff += mod_range;
                } else if diff >= mod_range / 2 {
                    diff -= mod_range;
                }

                let cat = category(diff);
                let encoded = encode_diff(diff, cat);

                writer.write_bits(ht.codes[cat as usize], ht.code_lengths[cat as usize] as u32);
                if cat > 0 {
                    writer.write_bits(encoded, cat);
                }
            }
        }

        writer.flush();
        output.push(MARKER_PREFIX);
        output.push(EOI);
        output
    }

    fn decode_frame(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>> {
        let data = compressed;
        let size = data.len();
        ensure!(
            size >= 2 && data[0] == MARKER_PREFIX && data[1] == SOI,
            DecodingFailedSnafu { reason: "missing SOI marker" }
        );
        let mut pos = 2usize;

        let mut precision = 0i32;
        let mut width = 0i32;
        let mut height = 0i32;
        let mut predictor = self.predictor;
        let mut point_transform = self.point_transform;
        let mut found_sof = false;
        let mut found_sos = false;
        let mut scan_start = 0usize;

        while pos + 1 < size {
            ensure!(
                data[pos] == MARKER_PREFIX,
                DecodingFailedSnafu { reason: "expected marker" }
            );
            let marker = data[pos + 1];
            pos += 2;

            if marker == EOI {
                break;
            }
            if marker == MARKER_PREFIX {
                pos -= 1;
                continue;
            }
            if (0xD0..=0xD7).contains(&marker) {
                continue;
            }

            ensure!(pos + 2 <= size, DecodingFailedSnafu { reason: "truncated marker" });
            let length = read_be16(&data[pos..]) as usize;
            pos += 2;
            ensure!(
                pos + length - 2 <= size,
                DecodingFailedSnafu { reason: "truncated marker data" }
            );

            if marker == SOF3 {
                ensure!(length >= 8, DecodingFailedSnafu { reason: "invalid SOF3 marker" });
                precision = data[pos] as i32;
                height = read_be16(&data[pos + 1..]) as i32;
                width = read_be16(&data[pos + 3..]) as i32;
                found_sof = true;
            } else if marker == SOS {
                if length >= 6 {
                    predictor = data[pos + 3];
                    point_transform = data[pos + 5] & 0x0F;
                }
                found_sos = true;
                pos += length - 2;
                scan_start = pos;
                break;
            }
            pos += length - 2;
        }

        ensure!(
            found_sof && found_sos,
            DecodingFailedSnafu { reason: "missing required JPEG Lossless markers" }
        );
        if params.width > 0 {
            ensure!(params.width as i32 == width, DecodingFailedSnafu { reason: "width mismatch" });
        }
        if params.height > 0 {
            ensure!(params.height as i32 == height, DecodingFailedSnafu { reason: "height mismatch" });
        }

        let mut scan_end = size;
        let mut i = scan_start;
        while i + 1 < size {
            if data[i] == MARKER_PREFIX && data[i + 1] == EOI {
                scan_end = i;
                break;
            }
            i += 1;
        }

        let is_16bit = precision > 8;
        let output_size = width as usize * height as usize * if is_16bit { 2 } else { 1 };
        let mut output = vec![0u8; output_size];

        let ht = HuffmanTable::new();
        let mut reader = BitReader::new(&data[scan_start..scan_end]);

        let mod_range = 1i32 << (precision - point_transform as i32);
        let max_value = (1i32 << precision) - 1;

        for y in 0..height {
            for x in 0..width {
                let cat = decode_huffman_category(&mut reader, &ht)?;
                let encoded = if cat > 0 { reader.read_bits(cat) } else { 0 };
                let diff = decode_diff(encoded, cat);

                let get_decoded_pixel = |out: &[u8], x: i32, y: i32| -> i32 {
                    if x < 0 || y < 0 {
                        return 0;
                    }
                    let mut idx = (y as usize) * width as usize + x as usize;
                    if is_16bit {
                        idx *= 2;
                        out[idx] as i32 | ((out[idx + 1] as i32) << 8)
                    } else {
                        out[idx] as i32
                    }
                };

                let ra = get_decoded_pixel(&output, x - 1, y);
                let rb = get_decoded_pixel(&output, x, y - 1);
                let rc = get_decoded_pixel(&output, x - 1, y - 1);

                let pt = point_transform as i32;
                let pred = if x == 0 && y == 0 {
                    1 << (precision - pt - 1)
                } else if y == 0 {
                    ra >> pt
                } else if x == 0 {
                    rb >> pt
                } else {
                    predict(ra >> pt, rb >> pt, rc >> pt, predictor)
                };

                let shifted_pixel = (pred + diff) & (mod_range - 1);
                let pixel = (shifted_pixel << pt).clamp(0, max_value);

                let mut idx = (y as usize) * width as usize + x as usize;
                if is_16bit {
                    idx *= 2;
                    output[idx] = (pixel & 0xFF) as u8;
                    output[idx + 1] = ((pixel >> 8) & 0xFF) as u8;
                } else {
                    output[idx] = pixel as u8;
                }
            }
        }

        Ok(output)
    }
}

fn decode_huffman_category(reader: &mut BitReader, ht: &HuffmanTable) -> Result<u32> {
    let mut code = 0u32;
    for bits in 1..=16u32 {
        code = (code << 1) | reader.read_bits(1);
        for cat in 0..=16usize {
            if ht.code_lengths[cat] as u32 == bits && ht.codes[cat] == code {
                return Ok(cat as u32);
            }
        }
    }
    Err(CodecError::DecodingFailed {
        reason: "invalid Huffman code in JPEG Lossless scan".to_string(),
        backtrace: snafu::Backtrace::capture(),
    })
}

fn write_sof3(output: &mut Vec<u8>, params: &ImageParams) {
    output.push(MARKER_PREFIX);
    output.push(SOF3);
    write_be16(output, 8 + 3); // 1 component
    output.push(params.bits_stored as u8);
    write_be16(output, params.height);
    write_be16(output, params.width);
    output.push(1); // number of components
    output.push(1); // component id
    output.push(0x11); // sampling factors 1x1
    output.push(0); // quantization table (unused for lossless)
}

fn write_dht(output: &mut Vec<u8>) {
    output.push(MARKER_PREFIX);
    output.push(DHT);

    let mut table_data = vec![0x00u8]; // DC table, id 0
    let mut length_counts = [0u8; 16];
    for &len in &CODE_LENGTHS {
        if (1..=16).contains(&len) {
            length_counts[len as usize - 1] += 1;
        }
    }
    table_data.extend_from_slice(&length_counts);

    for len in 1..=16u8 {
        for (symbol, &code_len) in CODE_LENGTHS.iter().enumerate() {
            if code_len == len {
                table_data.push(symbol as u8);
            }
        }
    }

    write_be16(output, 2 + table_data.len() as u16);
    output.extend_from_slice(&table_data);
}

fn write_sos(output: &mut Vec<u8>, predictor: u8, point_transform: u8) {
    output.push(MARKER_PREFIX);
    output.push(SOS);
    write_be16(output, 8);
    output.push(1); // number of components
    output.push(1); // component selector
    output.push(0x00); // DC=0, AC=0
    output.push(predictor); // spectral selection / predictor
    output.push(0); // spectral selection end (unused)
    output.push(point_transform); // successive approximation / point transform
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_params::PhotometricInterpretation;

    fn grayscale(width: u16, height: u16, bits: u16) -> ImageParams {
        ImageParams {
            width,
            height,
            bits_allocated: bits,
            bits_stored: bits,
            high_bit: bits - 1,
            samples_per_pixel: 1,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Monochrome2,
            number_of_frames: 1,
        }
    }

    #[test]
    fn round_trips_8bit_gradient() {
        let params = grayscale(8, 8, 8);
        let pixel_data: Vec<u8> = (0..64u16).map(|v| (v * 4) as u8).collect();
        let codec = JpegLosslessCodec::default();
        let encoded = codec.encode(&pixel_data, &params, &CompressionOptions::default()).expect("encode");
        let decoded = codec.decode(&encoded, &params).expect("decode");
        assert_eq!(decoded, pixel_data);
    }

    #[test]
    fn round_trips_16bit_frame() {
        let params = grayscale(4, 4, 16);
        let values: [u16; 16] = [
            0, 4369, 8738, 13107, 17476, 21845, 26214, 30583, 34952, 39321, 43690, 48059, 52428,
            56797, 61166, 65535,
        ];
        let mut pixel_data = Vec::with_capacity(32);
        for v in values {
            pixel_data.extend_from_slice(&v.to_le_bytes());
        }
        let codec = JpegLosslessCodec::default();
        let encoded = codec.encode(&pixel_data, &params, &CompressionOptions::default()).expect("encode");
        let decoded = codec.decode(&encoded, &params).expect("decode");
        assert_eq!(decoded, pixel_data);
    }

    #[test]
    fn rejects_color_input() {
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
        assert!(!params.valid_for_jpeg_lossless());
    }
}
