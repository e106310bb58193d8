//! Attribute tags and the small value-representation vocabulary needed to
//! read and write a DIMSE command group (always Implicit VR Little Endian,
//! spec §4.1).

use std::fmt;

/// A DICOM attribute tag, `group << 16 | element`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    /// Group part of the tag.
    pub fn group(self) -> u16 {
        self.0
    }

    /// Element part of the tag.
    pub fn element(self) -> u16 {
        self.1
    }

    /// Pack the tag into its `u32` wire representation (`group << 16 | element`).
    pub fn to_u32(self) -> u32 {
        (u32::from(self.0) << 16) | u32::from(self.1)
    }

    /// Unpack a tag from its `u32` wire representation.
    pub fn from_u32(value: u32) -> Self {
        Tag((value >> 16) as u16, (value & 0xFFFF) as u16)
    }

    /// Whether the tag belongs to the command group `(0000,xxxx)` used by
    /// the DIMSE command set.
    pub fn is_command_group(self) -> bool {
        self.0 == 0x0000
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Well-known command group tags (PS3.7 Annex E).
pub mod tags {
    use super::Tag;

    pub const COMMAND_GROUP_LENGTH: Tag = Tag(0x0000, 0x0000);
    pub const AFFECTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
    pub const REQUESTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0003);
    pub const COMMAND_FIELD: Tag = Tag(0x0000, 0x0100);
    pub const MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
    pub const MESSAGE_ID_BEING_RESPONDED_TO: Tag = Tag(0x0000, 0x0120);
    pub const PRIORITY: Tag = Tag(0x0000, 0x0700);
    pub const COMMAND_DATA_SET_TYPE: Tag = Tag(0x0000, 0x0800);
    pub const STATUS: Tag = Tag(0x0000, 0x0900);
    pub const AFFECTED_SOP_INSTANCE_UID: Tag = Tag(0x0000, 0x1000);
    pub const REQUESTED_SOP_INSTANCE_UID: Tag = Tag(0x0000, 0x1001);
    pub const MOVE_DESTINATION: Tag = Tag(0x0000, 0x0600);
    pub const NUMBER_OF_REMAINING_SUB_OPERATIONS: Tag = Tag(0x0000, 0x1020);
    pub const NUMBER_OF_COMPLETED_SUB_OPERATIONS: Tag = Tag(0x0000, 0x1021);
    pub const NUMBER_OF_FAILED_SUB_OPERATIONS: Tag = Tag(0x0000, 0x1022);
    pub const NUMBER_OF_WARNING_SUB_OPERATIONS: Tag = Tag(0x0000, 0x1023);
}

/// The subset of DICOM value representations that can appear in a DIMSE
/// command group. Command elements never use a VR requiring a 32-bit
/// length (no `OB`/`OW`/`SQ`/`UN` in the command set), so each decodes
/// under the standard Implicit VR 16-bit length rule (spec §4.1).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Vr {
    /// Unsigned Long, 4-byte little-endian integer.
    Ul,
    /// Unsigned Short, 2-byte little-endian integer.
    Us,
    /// Unique Identifier, ASCII dotted-decimal string, NUL padded to even length.
    Ui,
    /// Attribute Tag, a pair of `US` values.
    At,
}
