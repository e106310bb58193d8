//! The built-in transfer syntax table (spec §6).

use crate::{ByteOrder, PixelDataCodec, VrEncoding};

/// A single row of the built-in table, from which a [`crate::TransferSyntax`]
/// is constructed at registry start-up.
pub struct Entry {
    pub uid: &'static str,
    pub name: &'static str,
    pub byte_order: ByteOrder,
    pub vr_encoding: VrEncoding,
    pub pixel_data_codec: PixelDataCodec,
}

pub const IMPLICIT_VR_LITTLE_ENDIAN: Entry = Entry {
    uid: "1.2.840.10008.1.2",
    name: "Implicit VR Little Endian",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Implicit,
    pixel_data_codec: PixelDataCodec::Native,
};

pub const EXPLICIT_VR_LITTLE_ENDIAN: Entry = Entry {
    uid: "1.2.840.10008.1.2.1",
    name: "Explicit VR Little Endian",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::Native,
};

pub const EXPLICIT_VR_BIG_ENDIAN: Entry = Entry {
    uid: "1.2.840.10008.1.2.2",
    name: "Explicit VR Big Endian",
    byte_order: ByteOrder::BigEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::Native,
};

pub const JPEG_BASELINE: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.50",
    name: "JPEG Baseline (Process 1)",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::JpegBaseline,
};

pub const JPEG_LOSSLESS_NON_HIERARCHICAL_FIRST_ORDER_PREDICTION: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.70",
    name: "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::JpegLossless,
};

pub const JPEG_LS_LOSSLESS: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.80",
    name: "JPEG-LS Lossless Image Compression",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::JpegLs,
};

pub const JPEG_LS_NEAR_LOSSLESS: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.81",
    name: "JPEG-LS Lossy (Near-Lossless) Image Compression",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::JpegLs,
};

pub const JPEG_2000_LOSSLESS_ONLY: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.90",
    name: "JPEG 2000 Image Compression (Lossless Only)",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::Jpeg2000,
};

pub const JPEG_2000: Entry = Entry {
    uid: "1.2.840.10008.1.2.4.91",
    name: "JPEG 2000 Image Compression",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::Jpeg2000,
};

pub const RLE_LOSSLESS: Entry = Entry {
    uid: "1.2.840.10008.1.2.5",
    name: "RLE Lossless",
    byte_order: ByteOrder::LittleEndian,
    vr_encoding: VrEncoding::Explicit,
    pixel_data_codec: PixelDataCodec::Rle,
};

/// Every transfer syntax registered by default.
pub const BUILTIN: &[Entry] = &[
    IMPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_BIG_ENDIAN,
    JPEG_BASELINE,
    JPEG_LOSSLESS_NON_HIERARCHICAL_FIRST_ORDER_PREDICTION,
    JPEG_LS_LOSSLESS,
    JPEG_LS_NEAR_LOSSLESS,
    JPEG_2000_LOSSLESS_ONLY,
    JPEG_2000,
    RLE_LOSSLESS,
];
