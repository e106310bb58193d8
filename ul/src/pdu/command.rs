//! The DIMSE command group: a DICOM data set encoded in Implicit VR
//! Little Endian, containing elements in group `0x0000` (spec §4.1).
//!
//! Implicit VR elements are `tag(4) + length(4) + value(length)` with no
//! VR byte on the wire, so decoding the group does not require a data
//! dictionary. [`CommandSet`] keeps the decoded `(tag, bytes)` pairs in
//! wire order and exposes typed accessors that interpret the bytes on
//! demand.

use byteordered::byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pacs_core::tag::{tags, Tag};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::{Read, Write};

/// Errors raised while reading or writing a command group.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to read command element"))]
    Read {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("failed to write command element"))]
    Write {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("command element {} declared an undefined length", tag))]
    UndefinedLength { tag: Tag, backtrace: Backtrace },
    #[snafu(display("required command element {} is missing", tag))]
    MissingElement { tag: Tag, backtrace: Backtrace },
    #[snafu(display("command element {} has the wrong length for its expected type", tag))]
    WrongLength { tag: Tag, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One `(tag, value bytes)` pair from a decoded command group.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CommandElement {
    pub tag: Tag,
    pub value: Vec<u8>,
}

/// A decoded DIMSE command group, preserving wire order.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct CommandSet {
    elements: Vec<CommandElement>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an element by tag, appending if not already present.
    fn put_raw(&mut self, tag: Tag, value: Vec<u8>) {
        if let Some(existing) = self.elements.iter_mut().find(|e| e.tag == tag) {
            existing.value = value;
        } else {
            self.elements.push(CommandElement { tag, value });
        }
    }

    pub fn put_u16(&mut self, tag: Tag, value: u16) {
        self.put_raw(tag, value.to_le_bytes().to_vec());
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) {
        self.put_raw(tag, value.to_le_bytes().to_vec());
    }

    pub fn put_string(&mut self, tag: Tag, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.put_raw(tag, bytes);
    }

    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.elements
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.value.as_slice())
    }

    pub fn get_u16(&self, tag: Tag) -> Option<u16> {
        let bytes = self.get(tag)?;
        if bytes.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_u32(&self, tag: Tag) -> Option<u32> {
        let bytes = self.get(tag)?;
        if bytes.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_string(&self, tag: Tag) -> Option<String> {
        let bytes = self.get(tag)?;
        Some(
            String::from_utf8_lossy(bytes)
                .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string(),
        )
    }

    pub fn require_u16(&self, tag: Tag) -> Result<u16> {
        self.get_u16(tag).ok_or(Error::MissingElement {
            tag,
            backtrace: Backtrace::capture(),
        })
    }

    pub fn require_string(&self, tag: Tag) -> Result<String> {
        self.get_string(tag).ok_or(Error::MissingElement {
            tag,
            backtrace: Backtrace::capture(),
        })
    }

    pub fn message_id(&self) -> Option<u16> {
        self.get_u16(tags::MESSAGE_ID)
    }

    pub fn message_id_being_responded_to(&self) -> Option<u16> {
        self.get_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
    }

    pub fn command_field(&self) -> Option<u16> {
        self.get_u16(tags::COMMAND_FIELD)
    }

    pub fn status(&self) -> Option<u16> {
        self.get_u16(tags::STATUS)
    }

    /// Whether a data set follows this command (`DataSetType != 0x0101`).
    pub fn has_data_set(&self) -> bool {
        match self.get_u16(tags::COMMAND_DATA_SET_TYPE) {
            Some(dataset_type::ABSENT) => false,
            Some(_) => true,
            None => false,
        }
    }

    pub fn elements(&self) -> &[CommandElement] {
        &self.elements
    }
}

/// `DataSetType (0000,0800)` well-known values (spec §3).
pub mod dataset_type {
    pub const PRESENT: u16 = 0x0001;
    pub const ABSENT: u16 = 0x0101;
}

/// `CommandField (0000,0100)` values (spec §3).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum CommandField {
    C_STORE_RQ = 0x0001,
    C_STORE_RSP = 0x8001,
    C_GET_RQ = 0x0010,
    C_GET_RSP = 0x8010,
    C_FIND_RQ = 0x0020,
    C_FIND_RSP = 0x8020,
    C_MOVE_RQ = 0x0021,
    C_MOVE_RSP = 0x8021,
    C_ECHO_RQ = 0x0030,
    C_ECHO_RSP = 0x8030,
    C_CANCEL_RQ = 0x0FFF,
    N_CREATE_RQ = 0x0140,
    N_CREATE_RSP = 0x8140,
    N_SET_RQ = 0x0120,
    N_SET_RSP = 0x8120,
}

impl CommandField {
    pub fn from_u16(value: u16) -> Option<Self> {
        use CommandField::*;
        Some(match value {
            0x0001 => C_STORE_RQ,
            0x8001 => C_STORE_RSP,
            0x0010 => C_GET_RQ,
            0x8010 => C_GET_RSP,
            0x0020 => C_FIND_RQ,
            0x8020 => C_FIND_RSP,
            0x0021 => C_MOVE_RQ,
            0x8021 => C_MOVE_RSP,
            0x0030 => C_ECHO_RQ,
            0x8030 => C_ECHO_RSP,
            0x0FFF => C_CANCEL_RQ,
            0x0140 => N_CREATE_RQ,
            0x8140 => N_CREATE_RSP,
            0x0120 => N_SET_RQ,
            0x8120 => N_SET_RSP,
            _ => return None,
        })
    }
}

/// `Priority (0000,0700)` values.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u16)]
pub enum Priority {
    Low = 0x0002,
    Medium = 0x0000,
    High = 0x0001,
}

/// Read a command group from `reader`: a sequence of Implicit VR Little
/// Endian elements, terminated by EOF (the caller has already isolated
/// the command group's bytes by reassembling command PDV fragments).
pub fn read_command_set<R: Read>(reader: &mut R) -> Result<CommandSet> {
    let mut set = CommandSet::new();
    loop {
        let group = match reader.read_u16::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(source) => return Err(Error::Read { source, backtrace: Backtrace::capture() }),
        };
        let element = reader.read_u16::<LittleEndian>().context(ReadSnafu)?;
        let tag = Tag(group, element);
        let length = reader.read_u32::<LittleEndian>().context(ReadSnafu)?;
        ensure!(length != 0xFFFF_FFFF, UndefinedLengthSnafu { tag });
        let mut value = vec![0u8; length as usize];
        reader.read_exact(&mut value).context(ReadSnafu)?;
        set.put_raw(tag, value);
    }
    Ok(set)
}

/// Write a command group to `writer` in wire order (tag, then length,
/// then value), Implicit VR Little Endian.
pub fn write_command_set<W: Write>(writer: &mut W, set: &CommandSet) -> Result<()> {
    for element in &set.elements {
        writer
            .write_u16::<LittleEndian>(element.tag.group())
            .context(WriteSnafu)?;
        writer
            .write_u16::<LittleEndian>(element.tag.element())
            .context(WriteSnafu)?;
        ensure!(
            element.value.len() % 2 == 0,
            WrongLengthSnafu { tag: element.tag }
        );
        writer
            .write_u32::<LittleEndian>(element.value.len() as u32)
            .context(WriteSnafu)?;
        writer.write_all(&element.value).context(WriteSnafu)?;
    }
    Ok(())
}

/// Serialize a command group to a fresh byte buffer.
pub fn encode_command_set(set: &CommandSet) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_command_set(&mut buf, set)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_echo_rq() {
        let mut set = CommandSet::new();
        set.put_string(tags::AFFECTED_SOP_CLASS_UID, "1.2.840.10008.1.1");
        set.put_u16(tags::COMMAND_FIELD, CommandField::C_ECHO_RQ as u16);
        set.put_u16(tags::MESSAGE_ID, 1);
        set.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::ABSENT);

        let bytes = encode_command_set(&set).unwrap();
        let decoded = read_command_set(&mut &bytes[..]).unwrap();

        assert_eq!(decoded.message_id(), Some(1));
        assert_eq!(
            decoded.command_field(),
            Some(CommandField::C_ECHO_RQ as u16)
        );
        assert_eq!(
            decoded.get_string(tags::AFFECTED_SOP_CLASS_UID).as_deref(),
            Some("1.2.840.10008.1.1")
        );
        assert!(!decoded.has_data_set());
    }

    #[test]
    fn rejects_undefined_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let err = read_command_set(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, Error::UndefinedLength { .. }));
    }
}
