//! DICOM upper layer protocol and DIMSE message exchange (spec §4.1-§4.7).
//!
//! This crate owns the association state machine, PDU wire codec, and
//! DIMSE dispatcher. It treats the contents of a DICOM data set as an
//! opaque byte blob: encoding/decoding attribute values is outside this
//! crate's scope, so every data set here is a `Vec<u8>`/`&[u8]` already
//! encoded in the presentation context's negotiated transfer syntax.

pub mod acceptor;
pub mod address;
pub mod association;
pub mod dimse;
pub mod pcontext;
pub mod pdu;
pub mod scu;

pub use acceptor::Acceptor;
pub use address::{AeAddr, FullAeAddr};
pub use association::client::ClientAssociationOptions;
pub use association::server::ServerAssociationOptions;
pub use association::{Association, AssociationState};
pub use pcontext::{PresentationContext, PresentationContextTable};
