//! The registry of DICOM transfer syntaxes (spec §4.8).
//!
//! A transfer syntax UID determines three things at once: the byte
//! order and VR encoding used for the data set, and — for transfer
//! syntaxes with encapsulated pixel data — which pixel codec decodes
//! the `PixelData` element. This crate only describes the first two;
//! `pacs-pixeldata` separately maps the same UIDs to actual codec
//! implementations, so that a consumer who never touches pixel data
//! (for example a C-FIND-only SCU) does not need to depend on any
//! image codec crate.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use pacs_core::Uid;

pub mod entries;

/// How attribute values are laid out on the wire.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum VrEncoding {
    /// No VR is transmitted; it is inferred from the data dictionary.
    Implicit,
    /// The VR is transmitted with each element.
    Explicit,
}

/// Byte order of multi-byte values.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Whether a transfer syntax's pixel data is stored natively (as a
/// contiguous, uncompressed frame buffer) or encapsulated in a
/// compressed fragment stream, and if so, by which family of codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PixelDataCodec {
    Native,
    Rle,
    JpegBaseline,
    JpegLossless,
    JpegLs,
    Jpeg2000,
}

/// A fully described transfer syntax.
#[derive(Clone, Debug)]
pub struct TransferSyntax {
    uid: Uid,
    name: &'static str,
    byte_order: ByteOrder,
    vr_encoding: VrEncoding,
    pixel_data_codec: PixelDataCodec,
}

impl TransferSyntax {
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn vr_encoding(&self) -> VrEncoding {
        self.vr_encoding
    }

    pub fn pixel_data_codec(&self) -> PixelDataCodec {
        self.pixel_data_codec
    }

    pub fn is_encapsulated(&self) -> bool {
        !matches!(self.pixel_data_codec, PixelDataCodec::Native)
    }
}

/// The set of transfer syntaxes known at compile time (spec §4.8,
/// §6 minimum conformance set plus the compressed syntaxes the pixel
/// codec layer implements or wraps).
pub struct TransferSyntaxRegistry {
    by_uid: HashMap<String, TransferSyntax>,
}

impl fmt::Debug for TransferSyntaxRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSyntaxRegistry")
            .field("count", &self.by_uid.len())
            .finish()
    }
}

impl TransferSyntaxRegistry {
    fn new() -> Self {
        let by_uid = entries::BUILTIN
            .iter()
            .map(build_ts)
            .map(|ts| (ts.uid.as_str().to_string(), ts))
            .collect();
        TransferSyntaxRegistry { by_uid }
    }

    pub fn get(&self, uid: &str) -> Option<&TransferSyntax> {
        let trimmed = uid.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
        self.by_uid.get(trimmed)
    }

    pub fn is_supported(&self, uid: &str) -> bool {
        self.get(uid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferSyntax> {
        self.by_uid.values()
    }
}

fn build_ts(entry: &entries::Entry) -> TransferSyntax {
    TransferSyntax {
        uid: Uid::new(entry.uid).expect("built-in transfer syntax UID must be valid"),
        name: entry.name,
        byte_order: entry.byte_order,
        vr_encoding: entry.vr_encoding,
        pixel_data_codec: entry.pixel_data_codec,
    }
}

lazy_static! {
    /// The global transfer syntax registry.
    pub static ref REGISTRY: TransferSyntaxRegistry = TransferSyntaxRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knows_implicit_vr_little_endian() {
        let ts = REGISTRY.get("1.2.840.10008.1.2").expect("must be registered");
        assert_eq!(ts.vr_encoding(), VrEncoding::Implicit);
        assert_eq!(ts.byte_order(), ByteOrder::LittleEndian);
        assert!(!ts.is_encapsulated());
    }

    #[test]
    fn knows_rle_lossless() {
        let ts = REGISTRY
            .get("1.2.840.10008.1.2.5")
            .expect("must be registered");
        assert_eq!(ts.pixel_data_codec(), PixelDataCodec::Rle);
        assert!(ts.is_encapsulated());
    }

    #[test]
    fn trims_wire_padding_before_lookup() {
        assert!(REGISTRY.is_supported("1.2.840.10008.1.2\0"));
    }

    #[test]
    fn rejects_unknown_uid() {
        assert!(!REGISTRY.is_supported("1.2.3.4.5.6.7.8.9"));
    }
}
