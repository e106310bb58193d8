//! Encoding PDUs to the wire (spec §4.1).
//!
//! Every function here writes a complete item (including its own type
//! and length header) so the body-building functions can be composed
//! without tracking offsets by hand.

use std::io::Write;

use byteordered::byteorder::{BigEndian, WriteBytesExt};
use snafu::{Backtrace, ResultExt, Snafu};

use super::{
    item_type, pdu_type, AbortRQServiceProviderReason, AbortRQSource, AssociationRJResult,
    AssociationRJServiceProviderAcseReason, AssociationRJServiceProviderPresentationReason,
    AssociationRJServiceUserReason, AssociationRJSource, PDataValue, PDataValueType, Pdu,
    PresentationContextProposed, PresentationContextResult, UserVariables,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to write to the association's transport"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{item} is {len} bytes, which exceeds its 16-byte field"))]
    FieldTooLong {
        item: &'static str,
        len: usize,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn write_item<W: Write>(writer: &mut W, item_type: u8, body: &[u8]) -> Result<()> {
    writer.write_u8(item_type).context(IoSnafu)?;
    writer.write_u8(0).context(IoSnafu)?;
    writer
        .write_u16::<BigEndian>(body.len() as u16)
        .context(IoSnafu)?;
    writer.write_all(body).context(IoSnafu)?;
    Ok(())
}

fn fixed_ae_title(title: &str, item: &'static str) -> Result<[u8; 16]> {
    snafu::ensure!(title.len() <= 16, FieldTooLongSnafu { item, len: title.len() });
    let mut field = [b' '; 16];
    field[..title.len()].copy_from_slice(title.as_bytes());
    Ok(field)
}

/// Write a complete PDU: header followed by body.
pub fn write_pdu<W: Write>(writer: &mut W, pdu: &Pdu) -> Result<()> {
    let (pdu_type_byte, body) = match pdu {
        Pdu::AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => (
            pdu_type::ASSOCIATION_RQ,
            build_associate_rq_body(
                *protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            )?,
        ),
        Pdu::AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => (
            pdu_type::ASSOCIATION_AC,
            build_associate_ac_body(
                *protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            )?,
        ),
        Pdu::AssociationRJ { result, source } => {
            (pdu_type::ASSOCIATION_RJ, build_associate_rj_body(*result, *source))
        }
        Pdu::PData { data } => (pdu_type::P_DATA_TF, build_p_data_body(data)?),
        Pdu::ReleaseRQ => (pdu_type::RELEASE_RQ, vec![0u8; 4]),
        Pdu::ReleaseRP => (pdu_type::RELEASE_RP, vec![0u8; 4]),
        Pdu::Abort { source } => (pdu_type::ABORT, build_abort_body(*source)),
        Pdu::Unknown { pdu_type, data } => (*pdu_type, data.clone()),
    };

    writer.write_u8(pdu_type_byte).context(IoSnafu)?;
    writer.write_u8(0).context(IoSnafu)?;
    writer
        .write_u32::<BigEndian>(body.len() as u32)
        .context(IoSnafu)?;
    writer.write_all(&body).context(IoSnafu)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_associate_rq_body(
    protocol_version: u16,
    calling_ae_title: &str,
    called_ae_title: &str,
    application_context_name: &str,
    presentation_contexts: &[PresentationContextProposed],
    user_variables: &UserVariables,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.write_u16::<BigEndian>(protocol_version).context(IoSnafu)?;
    body.write_u16::<BigEndian>(0).context(IoSnafu)?;
    body.write_all(&fixed_ae_title(called_ae_title, "called AE title")?)
        .context(IoSnafu)?;
    body.write_all(&fixed_ae_title(calling_ae_title, "calling AE title")?)
        .context(IoSnafu)?;
    body.write_all(&[0u8; 32]).context(IoSnafu)?;

    write_item(
        &mut body,
        item_type::APPLICATION_CONTEXT,
        application_context_name.as_bytes(),
    )?;

    for pc in presentation_contexts {
        let mut pc_body = Vec::new();
        pc_body.write_u8(pc.id).context(IoSnafu)?;
        pc_body.write_all(&[0u8; 3]).context(IoSnafu)?;
        write_item(
            &mut pc_body,
            item_type::ABSTRACT_SYNTAX,
            pc.abstract_syntax.as_bytes(),
        )?;
        for ts in &pc.transfer_syntaxes {
            write_item(&mut pc_body, item_type::TRANSFER_SYNTAX, ts.as_bytes())?;
        }
        write_item(
            &mut body,
            item_type::PRESENTATION_CONTEXT_RQ,
            &pc_body,
        )?;
    }

    write_item(
        &mut body,
        item_type::USER_INFORMATION,
        &build_user_variables_body(user_variables)?,
    )?;

    Ok(body)
}

#[allow(clippy::too_many_arguments)]
fn build_associate_ac_body(
    protocol_version: u16,
    calling_ae_title: &str,
    called_ae_title: &str,
    application_context_name: &str,
    presentation_contexts: &[PresentationContextResult],
    user_variables: &UserVariables,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.write_u16::<BigEndian>(protocol_version).context(IoSnafu)?;
    body.write_u16::<BigEndian>(0).context(IoSnafu)?;
    body.write_all(&fixed_ae_title(called_ae_title, "called AE title")?)
        .context(IoSnafu)?;
    body.write_all(&fixed_ae_title(calling_ae_title, "calling AE title")?)
        .context(IoSnafu)?;
    body.write_all(&[0u8; 32]).context(IoSnafu)?;

    write_item(
        &mut body,
        item_type::APPLICATION_CONTEXT,
        application_context_name.as_bytes(),
    )?;

    for pc in presentation_contexts {
        let mut pc_body = Vec::new();
        pc_body.write_u8(pc.id).context(IoSnafu)?;
        pc_body.write_u8(0).context(IoSnafu)?;
        pc_body.write_u8(pc.reason as u8).context(IoSnafu)?;
        pc_body.write_u8(0).context(IoSnafu)?;
        write_item(
            &mut pc_body,
            item_type::TRANSFER_SYNTAX,
            pc.transfer_syntax.as_bytes(),
        )?;
        write_item(
            &mut body,
            item_type::PRESENTATION_CONTEXT_AC,
            &pc_body,
        )?;
    }

    write_item(
        &mut body,
        item_type::USER_INFORMATION,
        &build_user_variables_body(user_variables)?,
    )?;

    Ok(body)
}

fn build_user_variables_body(user_variables: &UserVariables) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    write_item(
        &mut body,
        item_type::MAX_PDU_LENGTH,
        &user_variables.max_pdu_length.to_be_bytes(),
    )?;
    write_item(
        &mut body,
        item_type::IMPLEMENTATION_CLASS_UID,
        user_variables.implementation_class_uid.as_bytes(),
    )?;
    if let Some(name) = &user_variables.implementation_version_name {
        write_item(
            &mut body,
            item_type::IMPLEMENTATION_VERSION_NAME,
            name.as_bytes(),
        )?;
    }
    Ok(body)
}

fn build_associate_rj_body(result: AssociationRJResult, source: AssociationRJSource) -> Vec<u8> {
    let result_byte = match result {
        AssociationRJResult::Permanent => 1,
        AssociationRJResult::Transient => 2,
    };
    let (source_byte, reason_byte) = match source {
        AssociationRJSource::ServiceUser(reason) => (
            1,
            match reason {
                AssociationRJServiceUserReason::NoReasonGiven => 1,
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported => 2,
                AssociationRJServiceUserReason::CallingAeTitleNotRecognized => 3,
                AssociationRJServiceUserReason::CalledAeTitleNotRecognized => 7,
                AssociationRJServiceUserReason::Reserved(value) => value,
            },
        ),
        AssociationRJSource::ServiceProviderAcse(reason) => (
            2,
            match reason {
                AssociationRJServiceProviderAcseReason::NoReasonGiven => 1,
                AssociationRJServiceProviderAcseReason::ProtocolVersionNotSupported => 2,
            },
        ),
        AssociationRJSource::ServiceProviderPresentation(reason) => (
            3,
            match reason {
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion => 1,
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => 2,
                AssociationRJServiceProviderPresentationReason::Reserved(value) => value,
            },
        ),
    };
    vec![0, result_byte, source_byte, reason_byte]
}

fn build_abort_body(source: AbortRQSource) -> Vec<u8> {
    let (source_byte, reason_byte) = match source {
        AbortRQSource::ServiceUser => (0, 0),
        AbortRQSource::ServiceProvider(reason) => (
            2,
            match reason {
                AbortRQServiceProviderReason::ReasonNotSpecified => 0,
                AbortRQServiceProviderReason::UnexpectedPdu => 1,
                AbortRQServiceProviderReason::UnexpectedPduParameter => 2,
                AbortRQServiceProviderReason::InvalidPduParameterValue => 4,
            },
        ),
    };
    vec![0, 0, source_byte, reason_byte]
}

fn build_p_data_body(values: &[PDataValue]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for value in values {
        let control_header = match value.value_type {
            PDataValueType::Command => 0b01,
            PDataValueType::Data => 0b00,
        } | if value.is_last { 0b10 } else { 0b00 };

        let item_len = 2 + value.data.len() as u32;
        body.write_u32::<BigEndian>(item_len).context(IoSnafu)?;
        body.write_u8(value.presentation_context_id).context(IoSnafu)?;
        body.write_u8(control_header).context(IoSnafu)?;
        body.write_all(&value.data).context(IoSnafu)?;
    }
    Ok(body)
}
