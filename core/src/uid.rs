//! DICOM unique identifiers.

use std::fmt;

use snafu::Snafu;

/// Maximum length of a UID, per the DICOM standard (PS3.5 Section 9).
pub const MAX_UID_LENGTH: usize = 64;

/// Errors that can occur when constructing a [`Uid`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum UidError {
    /// The UID exceeds the 64 character limit.
    #[snafu(display("UID `{}` is {} characters long, exceeding the 64 character limit", value, len))]
    TooLong { value: String, len: usize },

    /// The UID is empty.
    #[snafu(display("UID must not be empty"))]
    Empty,

    /// The UID contains a character outside `[0-9.]`.
    #[snafu(display("UID `{}` contains a non dotted-decimal character", value))]
    InvalidCharacter { value: String },
}

/// A dotted-decimal ASCII string identifying an abstract syntax (SOP
/// class), a transfer syntax, or a SOP instance.
///
/// DICOM pads UIDs transmitted on the wire with a single trailing NUL to
/// keep the element length even; [`Uid::new`] strips trailing whitespace
/// and NUL bytes before validating.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Uid(String);

impl Uid {
    /// Construct a UID, trimming wire padding and validating its shape.
    pub fn new(value: impl Into<String>) -> Result<Self, UidError> {
        let value = value.into();
        let trimmed = value
            .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string();

        if trimmed.is_empty() {
            return Err(UidError::Empty);
        }
        if trimmed.len() > MAX_UID_LENGTH {
            let len = trimmed.len();
            return Err(UidError::TooLong {
                value: trimmed,
                len,
            });
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return Err(UidError::InvalidCharacter { value: trimmed });
        }

        Ok(Uid(trimmed))
    }

    /// Borrow the UID as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode the UID with even-length padding for wire transmission.
    ///
    /// DICOM values must have an even byte length; a single trailing NUL
    /// is appended when the UID's length is odd.
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let mut bytes = self.0.clone().into_bytes();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        bytes
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Uid {
    type Err = UidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uid::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_decimal() {
        let uid = Uid::new("1.2.840.10008.1.1").unwrap();
        assert_eq!(uid.as_str(), "1.2.840.10008.1.1");
    }

    #[test]
    fn strips_wire_padding() {
        let uid = Uid::new("1.2.3.4\0").unwrap();
        assert_eq!(uid.as_str(), "1.2.3.4");
    }

    #[test]
    fn rejects_too_long() {
        let long = "1.".repeat(40);
        assert!(matches!(Uid::new(long), Err(UidError::TooLong { .. })));
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(matches!(
            Uid::new("1.2.ABC"),
            Err(UidError::InvalidCharacter { .. })
        ));
    }

    #[test]
    fn pads_odd_length_for_wire() {
        let uid = Uid::new("1.2.3").unwrap();
        let bytes = uid.to_padded_bytes();
        assert_eq!(bytes.len() % 2, 0);
        assert_eq!(bytes, b"1.2.3\0");
    }
}
