//! Protocol data units of the DICOM upper layer protocol (spec §4.1).
//!
//! A [`Pdu`] is the top-level wire frame: a 1-byte type, 1 reserved byte,
//! a 4-byte big-endian length, and a payload whose shape depends on the
//! type. [`reader::read_pdu`] and [`writer::write_pdu`] are the only
//! entry points that touch the wire; every other module works with the
//! decoded value types below.

pub mod command;
pub mod reader;
pub mod writer;

/// The length of the PDU header in bytes: 1-byte type, 1 reserved byte,
/// 4-byte length.
pub const PDU_HEADER_SIZE: u32 = 6;

/// The smallest max-PDU length a peer may propose, per the standard.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The largest max-PDU length a peer may propose, per the standard.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The max-PDU length this implementation proposes when the caller does
/// not configure one explicitly.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// A presentation context as proposed by an association requester.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationContextProposed {
    /// Odd-valued identifier chosen by the requester.
    pub id: u8,
    /// The abstract syntax (SOP class) UID.
    pub abstract_syntax: String,
    /// The transfer syntax UIDs proposed for this context, in the
    /// requester's preference order.
    pub transfer_syntaxes: Vec<String>,
}

/// The outcome of negotiating one presentation context, as sent back by
/// the acceptor in an A-ASSOCIATE-AC.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PresentationContextResult {
    /// Echoes the id from the corresponding proposal.
    pub id: u8,
    /// Why the context was accepted or rejected.
    pub reason: PresentationContextResultReason,
    /// The chosen transfer syntax. Only meaningful when `reason` is
    /// [`PresentationContextResultReason::Acceptance`].
    pub transfer_syntax: String,
}

/// Reason code for a presentation context's outcome (PS3.8 Table 9-18).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Acceptance,
            1 => Self::UserRejection,
            2 => Self::NoReason,
            3 => Self::AbstractSyntaxNotSupported,
            4 => Self::TransferSyntaxesNotSupported,
            _ => return None,
        })
    }
}

/// The `result` field of an A-ASSOCIATE-RJ.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJResult {
    /// The rejection is permanent; retrying without changes will fail again.
    Permanent,
    /// The rejection is transient; the requester may retry later.
    Transient,
}

/// The `source`/`reason` pair of an A-ASSOCIATE-RJ.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderAcse(AssociationRJServiceProviderAcseReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAeTitleNotRecognized,
    CalledAeTitleNotRecognized,
    Reserved(u8),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceProviderAcseReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

/// One fragment inside a P-DATA-TF PDU.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PDataValue {
    /// The presentation context this fragment belongs to.
    pub presentation_context_id: u8,
    /// Whether the fragment carries a command or a data set.
    pub value_type: PDataValueType,
    /// Whether this is the last fragment of its kind for the current
    /// message.
    pub is_last: bool,
    /// The fragment's payload bytes.
    pub data: Vec<u8>,
}

/// Distinguishes a command fragment from a data set fragment (message
/// control header bit 0).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

/// The `source`/`reason` pair of an A-ABORT.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnexpectedPdu,
    UnexpectedPduParameter,
    InvalidPduParameterValue,
}

/// User information sub-items carried by A-ASSOCIATE-RQ/AC (PS3.8 Annex D).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UserVariables {
    pub max_pdu_length: u32,
    pub implementation_class_uid: String,
    pub implementation_version_name: Option<String>,
}

/// A decoded protocol data unit.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Pdu {
    AssociationRQ {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextProposed>,
        user_variables: UserVariables,
    },
    AssociationAC {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextResult>,
        user_variables: UserVariables,
    },
    AssociationRJ {
        result: AssociationRJResult,
        source: AssociationRJSource,
    },
    PData {
        data: Vec<PDataValue>,
    },
    ReleaseRQ,
    ReleaseRP,
    Abort {
        source: AbortRQSource,
    },
    /// A syntactically valid PDU header whose type this implementation
    /// does not recognize. Carried so that callers can decide whether to
    /// abort or ignore, rather than the reader deciding unilaterally.
    Unknown { pdu_type: u8, data: Vec<u8> },
}

impl Pdu {
    /// A short, loggable description of the PDU, used at `tracing::debug!`
    /// call sites in the dispatcher and association modules.
    pub fn short_description(&self) -> String {
        match self {
            Pdu::AssociationRQ { calling_ae_title, called_ae_title, .. } => {
                format!("A-ASSOCIATE-RQ {calling_ae_title} -> {called_ae_title}")
            }
            Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC".to_string(),
            Pdu::AssociationRJ { result, .. } => format!("A-ASSOCIATE-RJ {result:?}"),
            Pdu::PData { data } => format!("P-DATA-TF ({} PDV(s))", data.len()),
            Pdu::ReleaseRQ => "A-RELEASE-RQ".to_string(),
            Pdu::ReleaseRP => "A-RELEASE-RP".to_string(),
            Pdu::Abort { source } => format!("A-ABORT {source:?}"),
            Pdu::Unknown { pdu_type, .. } => format!("Unknown PDU type 0x{pdu_type:02X}"),
        }
    }
}

/// PDU type byte values (spec §4.1).
pub mod pdu_type {
    pub const ASSOCIATION_RQ: u8 = 0x01;
    pub const ASSOCIATION_AC: u8 = 0x02;
    pub const ASSOCIATION_RJ: u8 = 0x03;
    pub const P_DATA_TF: u8 = 0x04;
    pub const RELEASE_RQ: u8 = 0x05;
    pub const RELEASE_RP: u8 = 0x06;
    pub const ABORT: u8 = 0x07;
}

/// Item type codes used within A-ASSOCIATE-RQ/AC (PS3.8 Annex D).
pub(crate) mod item_type {
    pub const APPLICATION_CONTEXT: u8 = 0x10;
    pub const PRESENTATION_CONTEXT_RQ: u8 = 0x20;
    pub const PRESENTATION_CONTEXT_AC: u8 = 0x21;
    pub const ABSTRACT_SYNTAX: u8 = 0x30;
    pub const TRANSFER_SYNTAX: u8 = 0x40;
    pub const USER_INFORMATION: u8 = 0x50;
    pub const MAX_PDU_LENGTH: u8 = 0x51;
    pub const IMPLEMENTATION_CLASS_UID: u8 = 0x52;
    pub const IMPLEMENTATION_VERSION_NAME: u8 = 0x55;
}
