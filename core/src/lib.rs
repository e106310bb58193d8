//! Shared types for the DICOM PACS core.
//!
//! This crate carries no networking or codec logic. It provides the
//! vocabulary that [`pacs-ul`](https://docs.rs/pacs-ul) and
//! [`pacs-pixeldata`](https://docs.rs/pacs-pixeldata) build on: unique
//! identifiers, attribute tags, the small value-representation subset
//! needed to read and write a DIMSE command group, and the DIMSE status
//! code table.

pub mod status;
pub mod tag;
pub mod uid;

pub use status::Status;
pub use tag::{Tag, Vr};
pub use uid::Uid;
