//! Decoding PDUs off the wire (spec §4.1).
//!
//! Every PDU starts with a 6-byte header: a 1-byte type, 1 reserved
//! byte, and a 4-byte big-endian length counting the bytes that follow.
//! [`read_pdu`] reads exactly one PDU and never reads past its declared
//! length, so the caller can keep reusing the same buffered reader for
//! the life of the association.

use std::io::Read;

use byteordered::byteorder::{BigEndian, ReadBytesExt};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

use super::{
    item_type, pdu_type, AbortRQServiceProviderReason, AbortRQSource, AssociationRJResult,
    AssociationRJServiceProviderAcseReason, AssociationRJServiceProviderPresentationReason,
    AssociationRJServiceUserReason, AssociationRJSource, PDataValue, PDataValueType, Pdu,
    PresentationContextProposed, PresentationContextResult, PresentationContextResultReason,
    UserVariables, MAXIMUM_PDU_SIZE,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to read from the association's transport"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU length {length} exceeds the maximum of {max}"))]
    TooLarge {
        length: u32,
        max: u32,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU is truncated: expected {expected} more byte(s), item ended early"))]
    Truncated { expected: usize, backtrace: Backtrace },
    #[snafu(display("PDU declared a bad internal length for {item}"))]
    BadLength { item: &'static str, backtrace: Backtrace },
    #[snafu(display("unrecognized presentation context result reason {value}"))]
    BadPresentationContextReason { value: u8, backtrace: Backtrace },
    #[snafu(display("malformed UTF-8/ASCII text in {item}"))]
    BadText {
        item: &'static str,
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Read exactly one PDU from `reader`.
///
/// `max_pdu_length` bounds the accepted PDU length as a defense against a
/// peer claiming an enormous length and exhausting memory; it should be
/// the larger of this association's own proposed/negotiated max-PDU and
/// [`super::MAXIMUM_PDU_SIZE`] (the association negotiation PDUs
/// themselves arrive before any max-PDU has been agreed).
pub fn read_pdu<R: Read>(reader: &mut R, max_pdu_length: u32) -> Result<Pdu> {
    let pdu_type_byte = reader.read_u8().context(IoSnafu)?;
    let _reserved = reader.read_u8().context(IoSnafu)?;
    let length = reader.read_u32::<BigEndian>().context(IoSnafu)?;
    let cap = max_pdu_length.max(MAXIMUM_PDU_SIZE);
    ensure!(length <= cap, TooLargeSnafu { length, max: cap });

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).context(IoSnafu)?;
    let mut cursor = &body[..];

    match pdu_type_byte {
        pdu_type::ASSOCIATION_RQ => read_associate_rq(&mut cursor),
        pdu_type::ASSOCIATION_AC => read_associate_ac(&mut cursor),
        pdu_type::ASSOCIATION_RJ => read_associate_rj(&mut cursor),
        pdu_type::P_DATA_TF => read_p_data(&mut cursor),
        pdu_type::RELEASE_RQ => Ok(Pdu::ReleaseRQ),
        pdu_type::RELEASE_RP => Ok(Pdu::ReleaseRP),
        pdu_type::ABORT => read_abort(&mut cursor),
        other => Ok(Pdu::Unknown {
            pdu_type: other,
            data: body,
        }),
    }
}

fn read_fixed_ascii(cursor: &mut &[u8], len: usize, item: &'static str) -> Result<String> {
    ensure!(cursor.len() >= len, TruncatedSnafu { expected: len });
    let (field, rest) = cursor.split_at(len);
    *cursor = rest;
    let text = String::from_utf8(field.to_vec()).context(BadTextSnafu { item })?;
    Ok(text.trim_end().to_string())
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16> {
    ensure!(cursor.len() >= 2, TruncatedSnafu { expected: 2usize });
    let value = cursor.read_u16::<BigEndian>().context(IoSnafu)?;
    Ok(value)
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let value = cursor.read_u32::<BigEndian>().context(IoSnafu)?;
    Ok(value)
}

fn read_item_header(cursor: &mut &[u8]) -> Result<(u8, u16)> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let item_type = cursor.read_u8().context(IoSnafu)?;
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let item_length = read_u16(cursor)?;
    Ok((item_type, item_length))
}

fn take(cursor: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    ensure!(cursor.len() >= len, TruncatedSnafu { expected: len });
    let (field, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(field.to_vec())
}

fn read_associate_rq(cursor: &mut &[u8]) -> Result<Pdu> {
    let protocol_version = read_u16(cursor)?;
    let _reserved = take(cursor, 2)?;
    let called_ae_title = read_fixed_ascii(cursor, 16, "called AE title")?;
    let calling_ae_title = read_fixed_ascii(cursor, 16, "calling AE title")?;
    let _reserved = take(cursor, 32)?;

    let mut application_context_name = String::new();
    let mut presentation_contexts = Vec::new();
    let mut user_variables = UserVariables {
        max_pdu_length: super::DEFAULT_MAX_PDU,
        implementation_class_uid: String::new(),
        implementation_version_name: None,
    };

    while !cursor.is_empty() {
        let (item_type, item_length) = read_item_header(cursor)?;
        let item_body = take(cursor, item_length as usize)?;
        let mut item_cursor = &item_body[..];
        match item_type {
            item_type::APPLICATION_CONTEXT => {
                application_context_name =
                    String::from_utf8(item_body).context(BadTextSnafu { item: "application context name" })?;
            }
            item_type::PRESENTATION_CONTEXT_RQ => {
                presentation_contexts.push(read_presentation_context_rq(&mut item_cursor)?);
            }
            item_type::USER_INFORMATION => {
                user_variables = read_user_variables(&mut item_cursor)?;
            }
            _ => { /* unrecognized sub-item, skip */ }
        }
    }

    Ok(Pdu::AssociationRQ {
        protocol_version,
        calling_ae_title,
        called_ae_title,
        application_context_name,
        presentation_contexts,
        user_variables,
    })
}

fn read_presentation_context_rq(cursor: &mut &[u8]) -> Result<PresentationContextProposed> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let id = cursor.read_u8().context(IoSnafu)?;
    let _reserved = take(cursor, 3)?;

    let mut abstract_syntax = String::new();
    let mut transfer_syntaxes = Vec::new();
    while !cursor.is_empty() {
        let (item_type, item_length) = read_item_header(cursor)?;
        let item_body = take(cursor, item_length as usize)?;
        match item_type {
            item_type::ABSTRACT_SYNTAX => {
                abstract_syntax =
                    String::from_utf8(item_body).context(BadTextSnafu { item: "abstract syntax" })?;
            }
            item_type::TRANSFER_SYNTAX => {
                transfer_syntaxes.push(
                    String::from_utf8(item_body).context(BadTextSnafu { item: "transfer syntax" })?,
                );
            }
            _ => {}
        }
    }

    Ok(PresentationContextProposed {
        id,
        abstract_syntax,
        transfer_syntaxes,
    })
}

fn read_user_variables(cursor: &mut &[u8]) -> Result<UserVariables> {
    let mut max_pdu_length = super::DEFAULT_MAX_PDU;
    let mut implementation_class_uid = String::new();
    let mut implementation_version_name = None;

    while !cursor.is_empty() {
        let (item_type, item_length) = read_item_header(cursor)?;
        let item_body = take(cursor, item_length as usize)?;
        match item_type {
            item_type::MAX_PDU_LENGTH => {
                ensure!(
                    item_body.len() == 4,
                    BadLengthSnafu { item: "max PDU length" }
                );
                max_pdu_length = u32::from_be_bytes([
                    item_body[0],
                    item_body[1],
                    item_body[2],
                    item_body[3],
                ]);
            }
            item_type::IMPLEMENTATION_CLASS_UID => {
                implementation_class_uid = String::from_utf8(item_body)
                    .context(BadTextSnafu { item: "implementation class UID" })?;
            }
            item_type::IMPLEMENTATION_VERSION_NAME => {
                implementation_version_name = Some(
                    String::from_utf8(item_body)
                        .context(BadTextSnafu { item: "implementation version name" })?,
                );
            }
            _ => {}
        }
    }

    Ok(UserVariables {
        max_pdu_length,
        implementation_class_uid,
        implementation_version_name,
    })
}

fn read_associate_ac(cursor: &mut &[u8]) -> Result<Pdu> {
    let protocol_version = read_u16(cursor)?;
    let _reserved = take(cursor, 2)?;
    let called_ae_title = read_fixed_ascii(cursor, 16, "called AE title")?;
    let calling_ae_title = read_fixed_ascii(cursor, 16, "calling AE title")?;
    let _reserved = take(cursor, 32)?;

    let mut application_context_name = String::new();
    let mut presentation_contexts = Vec::new();
    let mut user_variables = UserVariables {
        max_pdu_length: super::DEFAULT_MAX_PDU,
        implementation_class_uid: String::new(),
        implementation_version_name: None,
    };

    while !cursor.is_empty() {
        let (item_type, item_length) = read_item_header(cursor)?;
        let item_body = take(cursor, item_length as usize)?;
        let mut item_cursor = &item_body[..];
        match item_type {
            item_type::APPLICATION_CONTEXT => {
                application_context_name =
                    String::from_utf8(item_body).context(BadTextSnafu { item: "application context name" })?;
            }
            item_type::PRESENTATION_CONTEXT_AC => {
                presentation_contexts.push(read_presentation_context_ac(&mut item_cursor)?);
            }
            item_type::USER_INFORMATION => {
                user_variables = read_user_variables(&mut item_cursor)?;
            }
            _ => {}
        }
    }

    Ok(Pdu::AssociationAC {
        protocol_version,
        calling_ae_title,
        called_ae_title,
        application_context_name,
        presentation_contexts,
        user_variables,
    })
}

fn read_presentation_context_ac(cursor: &mut &[u8]) -> Result<PresentationContextResult> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let id = cursor.read_u8().context(IoSnafu)?;
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let reason_byte = cursor.read_u8().context(IoSnafu)?;
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let reason = PresentationContextResultReason::from_u8(reason_byte)
        .context(BadPresentationContextReasonSnafu { value: reason_byte })?;

    let mut transfer_syntax = String::new();
    while !cursor.is_empty() {
        let (item_type, item_length) = read_item_header(cursor)?;
        let item_body = take(cursor, item_length as usize)?;
        if item_type == item_type::TRANSFER_SYNTAX {
            transfer_syntax =
                String::from_utf8(item_body).context(BadTextSnafu { item: "transfer syntax" })?;
        }
    }

    Ok(PresentationContextResult {
        id,
        reason,
        transfer_syntax,
    })
}

fn read_associate_rj(cursor: &mut &[u8]) -> Result<Pdu> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let result_byte = cursor.read_u8().context(IoSnafu)?;
    let source_byte = cursor.read_u8().context(IoSnafu)?;
    let reason_byte = cursor.read_u8().context(IoSnafu)?;

    let result = match result_byte {
        1 => AssociationRJResult::Permanent,
        2 => AssociationRJResult::Transient,
        _ => AssociationRJResult::Permanent,
    };

    let source = match source_byte {
        1 => AssociationRJSource::ServiceUser(match reason_byte {
            1 => AssociationRJServiceUserReason::NoReasonGiven,
            2 => AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            3 => AssociationRJServiceUserReason::CallingAeTitleNotRecognized,
            7 => AssociationRJServiceUserReason::CalledAeTitleNotRecognized,
            other => AssociationRJServiceUserReason::Reserved(other),
        }),
        2 => AssociationRJSource::ServiceProviderAcse(match reason_byte {
            2 => AssociationRJServiceProviderAcseReason::ProtocolVersionNotSupported,
            _ => AssociationRJServiceProviderAcseReason::NoReasonGiven,
        }),
        _ => AssociationRJSource::ServiceProviderPresentation(match reason_byte {
            1 => AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            2 => AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            other => AssociationRJServiceProviderPresentationReason::Reserved(other),
        }),
    };

    Ok(Pdu::AssociationRJ { result, source })
}

fn read_p_data(cursor: &mut &[u8]) -> Result<Pdu> {
    let mut values = Vec::new();
    while !cursor.is_empty() {
        let item_length = read_u32(cursor)?;
        ensure!(
            cursor.len() as u32 >= item_length,
            TruncatedSnafu {
                expected: item_length as usize
            }
        );
        ensure!(item_length >= 2, BadLengthSnafu { item: "PDV item" });
        let presentation_context_id = cursor.read_u8().context(IoSnafu)?;
        let control_header = cursor.read_u8().context(IoSnafu)?;
        let data_len = (item_length - 2) as usize;
        let data = take(cursor, data_len)?;

        let value_type = if control_header & 0b01 != 0 {
            PDataValueType::Command
        } else {
            PDataValueType::Data
        };
        let is_last = control_header & 0b10 != 0;

        values.push(PDataValue {
            presentation_context_id,
            value_type,
            is_last,
            data,
        });
    }
    Ok(Pdu::PData { data: values })
}

fn read_abort(cursor: &mut &[u8]) -> Result<Pdu> {
    ensure!(cursor.len() >= 4, TruncatedSnafu { expected: 4usize });
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let _reserved = cursor.read_u8().context(IoSnafu)?;
    let source_byte = cursor.read_u8().context(IoSnafu)?;
    let reason_byte = cursor.read_u8().context(IoSnafu)?;

    let source = match source_byte {
        0 => AbortRQSource::ServiceUser,
        _ => AbortRQSource::ServiceProvider(match reason_byte {
            1 => AbortRQServiceProviderReason::UnexpectedPdu,
            2 => AbortRQServiceProviderReason::UnexpectedPduParameter,
            4 => AbortRQServiceProviderReason::InvalidPduParameterValue,
            _ => AbortRQServiceProviderReason::ReasonNotSpecified,
        }),
    };

    Ok(Pdu::Abort { source })
}

#[cfg(test)]
mod tests {
    use super::super::writer::write_pdu;
    use super::*;

    fn sample_rq() -> Pdu {
        Pdu::AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            }],
            user_variables: UserVariables {
                max_pdu_length: 16_384,
                implementation_class_uid: "1.2.3.4".to_string(),
                implementation_version_name: Some("TEST_1".to_string()),
            },
        }
    }

    #[test]
    fn round_trips_associate_rq() {
        let mut buf = Vec::new();
        write_pdu(&mut buf, &sample_rq()).unwrap();
        let decoded = read_pdu(&mut &buf[..], super::super::MAXIMUM_PDU_SIZE).unwrap();
        match decoded {
            Pdu::AssociationRQ {
                calling_ae_title,
                called_ae_title,
                presentation_contexts,
                ..
            } => {
                assert_eq!(calling_ae_title, "SCU");
                assert_eq!(called_ae_title, "SCP");
                assert_eq!(presentation_contexts.len(), 1);
                assert_eq!(presentation_contexts[0].abstract_syntax, "1.2.840.10008.1.1");
            }
            other => panic!("unexpected PDU: {other:?}"),
        }
    }

    #[test]
    fn rejects_oversized_pdu() {
        let mut header = Vec::new();
        header.push(pdu_type::P_DATA_TF);
        header.push(0);
        header.extend_from_slice(&(MAXIMUM_PDU_SIZE + 1).to_be_bytes());
        let err = read_pdu(&mut &header[..], super::super::DEFAULT_MAX_PDU).unwrap_err();
        assert!(matches!(err, Error::TooLarge { .. }));
    }

    #[test]
    fn decodes_unknown_pdu_type_without_failing() {
        let mut buf = Vec::new();
        buf.push(0xEE);
        buf.push(0);
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[1, 2, 3, 4]);
        let decoded = read_pdu(&mut &buf[..], super::super::MAXIMUM_PDU_SIZE).unwrap();
        assert!(matches!(decoded, Pdu::Unknown { pdu_type: 0xEE, .. }));
    }
}
