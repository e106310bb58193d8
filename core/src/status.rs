//! DIMSE status codes (spec §7), as carried in the `Status (0000,0900)`
//! command element.

/// A DIMSE status code together with its coarse classification.
///
/// Status codes are 16-bit values; the classification ranges below are
/// the ones referenced throughout spec §4.4/§7/§8. Handler-specific
/// failure codes in the `0xC000` range are represented as
/// [`Status::Failure`] carrying the raw code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Status {
    /// `0x0000` — the operation completed with no issues.
    Success,
    /// `0xFF00` / `0xFF01` — an intermediate response is still forthcoming.
    Pending,
    /// `0xFE00` — the operation was cancelled by a C-CANCEL-RQ.
    Cancel,
    /// `0xB000`-range — the operation completed with caveats (for
    /// example, coercion of data elements during a C-STORE).
    Warning(u16),
    /// `0xA700`/`0xA900`-range and `0xC000`-range handler-specific
    /// failures, plus any other non-success code.
    Failure(u16),
}

impl Status {
    /// The raw 16-bit status code as transmitted in the `Status` command
    /// element.
    pub fn code(self) -> u16 {
        match self {
            Status::Success => 0x0000,
            Status::Pending => 0xFF00,
            Status::Cancel => 0xFE00,
            Status::Warning(code) => code,
            Status::Failure(code) => code,
        }
    }

    /// Classify a raw status code read off the wire.
    pub fn from_code(code: u16) -> Status {
        match code {
            0x0000 => Status::Success,
            0xFF00 | 0xFF01 => Status::Pending,
            0xFE00 => Status::Cancel,
            0xB000..=0xB7FF => Status::Warning(code),
            other => Status::Failure(other),
        }
    }

    /// Whether this status terminates a streaming operation (anything
    /// other than [`Status::Pending`]).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

/// Well-known status codes, named per spec §7/§8.
pub mod codes {
    /// Success (`0x0000`).
    pub const SUCCESS: u16 = 0x0000;
    /// Pending, matches are continuing (`0xFF00`).
    pub const PENDING: u16 = 0xFF00;
    /// Pending, optional keys not supported (`0xFF01`).
    pub const PENDING_OPTIONAL_KEYS_NOT_SUPPORTED: u16 = 0xFF01;
    /// Operation cancelled (`0xFE00`).
    pub const CANCEL: u16 = 0xFE00;
    /// Coercion of data elements (`0xB000`), a C-STORE warning.
    pub const WARNING_COERCION_OF_DATA_ELEMENTS: u16 = 0xB000;
    /// Data set does not match SOP class (`0xB007`).
    pub const WARNING_DATASET_DOES_NOT_MATCH_SOP_CLASS: u16 = 0xB007;
    /// Refused: out of resources (`0xA700`).
    pub const FAILURE_OUT_OF_RESOURCES: u16 = 0xA700;
    /// Error: data set does not match SOP class (`0xA900`).
    pub const FAILURE_DATASET_DOES_NOT_MATCH_SOP_CLASS: u16 = 0xA900;
    /// Error: cannot understand (`0xC000`), the base of the
    /// handler-specific failure range.
    pub const FAILURE_CANNOT_UNDERSTAND: u16 = 0xC000;
    /// Refused: SOP class not supported (`0x0122`), used for unknown
    /// abstract syntaxes reaching a handler.
    pub const FAILURE_SOP_CLASS_NOT_SUPPORTED: u16 = 0x0122;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_well_known_codes() {
        assert_eq!(Status::from_code(0x0000).code(), 0x0000);
        assert_eq!(Status::from_code(0xFF00).code(), 0xFF00);
        assert_eq!(Status::from_code(0xFE00).code(), 0xFE00);
    }

    #[test]
    fn classifies_warning_range() {
        assert!(matches!(Status::from_code(0xB000), Status::Warning(0xB000)));
    }

    #[test]
    fn classifies_failure_range() {
        assert!(matches!(Status::from_code(0xC000), Status::Failure(0xC000)));
        assert!(matches!(Status::from_code(0xA700), Status::Failure(0xA700)));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!Status::Pending.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(Status::Cancel.is_terminal());
    }
}
