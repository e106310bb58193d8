//! Pixel data codecs for the DICOM transfer syntaxes that carry
//! compressed imagery.
//!
//! [`pacs-transfer-syntax-registry`](https://docs.rs/pacs-transfer-syntax-registry)
//! classifies a transfer syntax UID by codec *family*
//! ([`pacs_transfer_syntax_registry::PixelDataCodec`]); this crate maps
//! the same UIDs to actual [`Codec`] implementations. RLE Lossless and
//! JPEG Lossless are implemented from scratch; JPEG Baseline, JPEG-LS
//! and JPEG 2000 wrap external codec crates behind feature flags so a
//! consumer who only needs, say, RLE does not have to link libjpeg-like
//! dependencies.

pub mod codec;
pub mod image_params;
pub mod rle;

#[cfg(feature = "jpeg-baseline")]
pub mod jpeg_baseline;
#[cfg(feature = "jpeg2000")]
pub mod jpeg2000;
#[cfg(feature = "jpeg-ls")]
pub mod jpeg_ls;

pub mod jpeg_lossless;

pub use codec::{ChromaSubsampling, Codec, CodecError, CompressionOptions};
pub use image_params::{ImageParams, PhotometricInterpretation};
pub use rle::RleCodec;

/// Look up the codec for a transfer syntax UID, if this crate implements
/// (or wraps) one. Trailing wire padding (NUL or whitespace) is trimmed
/// before comparison, matching how UIDs arrive off the network.
pub fn codec_for(transfer_syntax_uid: &str) -> Option<Box<dyn Codec>> {
    let uid = transfer_syntax_uid.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    match uid {
        rle::TRANSFER_SYNTAX_UID => Some(Box::new(RleCodec)),
        jpeg_lossless::TRANSFER_SYNTAX_UID => Some(Box::new(jpeg_lossless::JpegLosslessCodec::default())),
        #[cfg(feature = "jpeg-baseline")]
        jpeg_baseline::TRANSFER_SYNTAX_UID => Some(Box::new(jpeg_baseline::JpegBaselineCodec)),
        #[cfg(feature = "jpeg-ls")]
        jpeg_ls::LOSSLESS_TRANSFER_SYNTAX_UID => Some(Box::new(jpeg_ls::JpegLsCodec::lossless())),
        #[cfg(feature = "jpeg-ls")]
        jpeg_ls::NEAR_LOSSLESS_TRANSFER_SYNTAX_UID => Some(Box::new(jpeg_ls::JpegLsCodec::near_lossless())),
        #[cfg(feature = "jpeg2000")]
        jpeg2000::LOSSLESS_TRANSFER_SYNTAX_UID => Some(Box::new(jpeg2000::Jpeg2000Codec::lossless_only())),
        #[cfg(feature = "jpeg2000")]
        jpeg2000::TRANSFER_SYNTAX_UID => Some(Box::new(jpeg2000::Jpeg2000Codec::general())),
        _ => None,
    }
}

/// Compress one frame using the codec registered for `transfer_syntax_uid`.
pub fn encode(
    transfer_syntax_uid: &str,
    pixel_data: &[u8],
    params: &ImageParams,
    options: &CompressionOptions,
) -> codec::Result<Vec<u8>> {
    let codec = codec_for(transfer_syntax_uid).ok_or_else(|| CodecError::UnsupportedTransferSyntax {
        uid: transfer_syntax_uid.to_string(),
        backtrace: snafu::Backtrace::capture(),
    })?;
    codec.encode(pixel_data, params, options)
}

/// Decompress one frame using the codec registered for `transfer_syntax_uid`.
pub fn decode(transfer_syntax_uid: &str, compressed: &[u8], params: &ImageParams) -> codec::Result<Vec<u8>> {
    let codec = codec_for(transfer_syntax_uid).ok_or_else(|| CodecError::UnsupportedTransferSyntax {
        uid: transfer_syntax_uid.to_string(),
        backtrace: snafu::Backtrace::capture(),
    })?;
    codec.decode(compressed, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_rle_by_uid() {
        let codec = codec_for("1.2.840.10008.1.2.5").expect("must resolve");
        assert_eq!(codec.transfer_syntax_uid(), rle::TRANSFER_SYNTAX_UID);
    }

    #[test]
    fn trims_wire_padding_before_lookup() {
        assert!(codec_for("1.2.840.10008.1.2.5\0").is_some());
    }

    #[test]
    fn returns_none_for_native_transfer_syntax() {
        assert!(codec_for("1.2.840.10008.1.2.1").is_none());
    }

    #[test]
    fn top_level_decode_reports_unsupported_transfer_syntax() {
        let params = ImageParams {
            width: 1,
            height: 1,
            bits_allocated: 8,
            bits_stored: 8,
            high_bit: 7,
            samples_per_pixel: 1,
            planar_configuration: 0,
            pixel_representation: 0,
            photometric: PhotometricInterpretation::Monochrome2,
            number_of_frames: 1,
        };
        let err = decode("1.2.840.10008.1.2.1", &[0u8], &params).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedTransferSyntax { .. }));
    }
}
