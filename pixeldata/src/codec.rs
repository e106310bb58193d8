//! The codec trait every transfer syntax's pixel data implementation
//! satisfies, plus the errors and options shared across all of them.

use snafu::{Backtrace, Snafu};

use crate::image_params::ImageParams;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum CodecError {
    #[snafu(display("invalid image parameters for {codec}: {reason}"))]
    InvalidParameters {
        codec: &'static str,
        reason: String,
        backtrace: Backtrace,
    },
    #[snafu(display("transfer syntax {uid} is not supported by this codec"))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },
    #[snafu(display("encoding failed: {reason}"))]
    EncodingFailed { reason: String, backtrace: Backtrace },
    #[snafu(display("decoding failed: {reason}"))]
    DecodingFailed { reason: String, backtrace: Backtrace },
}

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Chroma subsampling ratio for color input, where a codec supports it.
/// `0` keeps full chroma resolution (4:4:4), `1` halves it horizontally
/// (4:2:2), `2` halves it in both directions (4:2:0).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub enum ChromaSubsampling {
    #[default]
    None = 0,
    Horizontal = 1,
    Both = 2,
}

/// Tunables accepted by lossy codecs. Ignored by lossless ones.
#[derive(Clone, Copy, Debug)]
pub struct CompressionOptions {
    /// 1-100, higher is better quality. Meaning is codec-specific.
    pub quality: u8,
    /// Request the codec's lossless mode, if it has one, regardless of
    /// `quality`.
    pub lossless: bool,
    /// Progressive/hierarchical encoding, where the codec supports it.
    pub progressive: bool,
    /// Subsample chroma planes for color input, where supported.
    pub chroma_subsampling: ChromaSubsampling,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        CompressionOptions {
            quality: 85,
            lossless: false,
            progressive: false,
            chroma_subsampling: ChromaSubsampling::None,
        }
    }
}

/// A codec for one DICOM transfer syntax's `PixelData` representation.
///
/// Implementations cover everything from a from-scratch bitstream codec
/// (RLE, JPEG Lossless) to a thin wrapper over an external image codec
/// crate (JPEG Baseline, JPEG-LS, JPEG 2000); callers never need to know
/// which.
pub trait Codec: Send + Sync {
    fn transfer_syntax_uid(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn is_lossy(&self) -> bool;
    fn can_encode(&self, params: &ImageParams) -> bool;
    fn can_decode(&self, params: &ImageParams) -> bool;

    /// Compress one frame of native pixel data.
    fn encode(
        &self,
        pixel_data: &[u8],
        params: &ImageParams,
        options: &CompressionOptions,
    ) -> Result<Vec<u8>>;

    /// Decompress one frame back to native pixel data.
    fn decode(&self, compressed: &[u8], params: &ImageParams) -> Result<Vec<u8>>;
}
