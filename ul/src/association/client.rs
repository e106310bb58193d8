//! Requester-side association negotiation (spec §4.2 steps 1-4, §4.7).

use std::net::{TcpStream, ToSocketAddrs};

use pacs_core::Uid;
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{info, warn};

use crate::address::FullAeAddr;
use crate::pcontext::{PresentationContext, PresentationContextTable};
use crate::pdu::{self, PresentationContextProposed, Pdu, UserVariables};

use super::Association;
use super::server::APPLICATION_CONTEXT_NAME;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to connect to {addr}"))]
    Connect {
        addr: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU exchange failed during negotiation"))]
    Pdu {
        source: super::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("association was rejected: {result:?} / {source:?}"))]
    Rejected {
        result: pdu::AssociationRJResult,
        #[snafu(source(false))]
        source: pdu::AssociationRJSource,
        backtrace: Backtrace,
    },
    #[snafu(display("the peer aborted the association during negotiation"))]
    Aborted { backtrace: Backtrace },
    #[snafu(display("unexpected PDU during negotiation: {description}"))]
    Unexpected { description: String, backtrace: Backtrace },
    #[snafu(display("no presentation context was accepted"))]
    NoContextAccepted { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One abstract syntax an SCU wants to propose, with its candidate
/// transfer syntaxes in preference order.
#[derive(Clone, Debug)]
pub struct ProposedAbstractSyntax {
    pub uid: Uid,
    pub transfer_syntaxes: Vec<Uid>,
}

/// What an SCU proposes when opening an association.
pub struct ClientAssociationOptions {
    pub calling_ae_title: String,
    pub called: FullAeAddr,
    pub proposed_abstract_syntaxes: Vec<ProposedAbstractSyntax>,
    pub max_pdu_length: u32,
    pub implementation_class_uid: String,
    pub implementation_version_name: Option<String>,
}

impl ClientAssociationOptions {
    pub fn new(calling_ae_title: impl Into<String>, called: FullAeAddr) -> Self {
        ClientAssociationOptions {
            calling_ae_title: calling_ae_title.into(),
            called,
            proposed_abstract_syntaxes: Vec::new(),
            max_pdu_length: pdu::DEFAULT_MAX_PDU,
            implementation_class_uid: "1.2.826.0.1.3680043.9.7433.1.1".to_string(),
            implementation_version_name: Some("PACS_CORE_001".to_string()),
        }
    }

    pub fn with_abstract_syntax(
        mut self,
        uid: Uid,
        transfer_syntaxes: impl IntoIterator<Item = Uid>,
    ) -> Self {
        self.proposed_abstract_syntaxes.push(ProposedAbstractSyntax {
            uid,
            transfer_syntaxes: transfer_syntaxes.into_iter().collect(),
        });
        self
    }

    pub fn establish(&self) -> Result<Association<TcpStream, TcpStream>> {
        let addr = self
            .called
            .to_socket_addr()
            .context(ConnectSnafu { addr: self.called.to_string() })?;
        self.establish_to(addr)
    }

    fn establish_to(&self, addr: impl ToSocketAddrs) -> Result<Association<TcpStream, TcpStream>> {
        let stream = TcpStream::connect(addr).context(ConnectSnafu {
            addr: self.called.to_string(),
        })?;
        let reader_half = stream.try_clone().context(ConnectSnafu {
            addr: self.called.to_string(),
        })?;
        let writer_half = stream;
        let mut reader = std::io::BufReader::new(reader_half.try_clone().context(ConnectSnafu {
            addr: self.called.to_string(),
        })?);
        let mut writer = std::io::BufWriter::new(writer_half.try_clone().context(ConnectSnafu {
            addr: self.called.to_string(),
        })?);

        let mut id_counter = 1u8;
        let presentation_contexts: Vec<PresentationContextProposed> = self
            .proposed_abstract_syntaxes
            .iter()
            .map(|proposed| {
                let pc = PresentationContextProposed {
                    id: id_counter,
                    abstract_syntax: proposed.uid.as_str().to_string(),
                    transfer_syntaxes: proposed
                        .transfer_syntaxes
                        .iter()
                        .map(|ts| ts.as_str().to_string())
                        .collect(),
                };
                id_counter = id_counter.wrapping_add(2);
                pc
            })
            .collect();

        pdu::writer::write_pdu(
            &mut writer,
            &Pdu::AssociationRQ {
                protocol_version: 1,
                calling_ae_title: self.calling_ae_title.clone(),
                called_ae_title: self.called.ae_title().to_string(),
                application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
                presentation_contexts,
                user_variables: UserVariables {
                    max_pdu_length: self.max_pdu_length,
                    implementation_class_uid: self.implementation_class_uid.clone(),
                    implementation_version_name: self.implementation_version_name.clone(),
                },
            },
        )
        .map_err(|source| Error::Pdu {
            source: super::Error::Write { source, backtrace: Backtrace::capture() },
            backtrace: Backtrace::capture(),
        })?;
        std::io::Write::flush(&mut writer).context(ConnectSnafu {
            addr: self.called.to_string(),
        })?;

        let response = pdu::reader::read_pdu(&mut reader, pdu::MAXIMUM_PDU_SIZE)
            .map_err(|source| Error::Pdu {
                source: super::Error::Read { source, backtrace: Backtrace::capture() },
                backtrace: Backtrace::capture(),
            })?;

        match response {
            Pdu::AssociationAC {
                calling_ae_title,
                called_ae_title,
                presentation_contexts,
                user_variables,
                ..
            } => {
                let mut table = PresentationContextTable::new();
                for result in &presentation_contexts {
                    if !matches!(
                        result.reason,
                        pdu::PresentationContextResultReason::Acceptance
                    ) {
                        warn!(id = result.id, reason = ?result.reason, "presentation context rejected");
                        continue;
                    }
                    let abstract_syntax = self
                        .proposed_abstract_syntaxes
                        .get(((result.id - 1) / 2) as usize)
                        .map(|p| p.uid.clone());
                    if let (Some(abstract_syntax), Ok(transfer_syntax)) = (
                        abstract_syntax,
                        Uid::new(result.transfer_syntax.clone()),
                    ) {
                        table.insert(PresentationContext {
                            id: result.id,
                            abstract_syntax,
                            transfer_syntax,
                        });
                    }
                }

                if table.is_empty() {
                    return Err(Error::NoContextAccepted { backtrace: Backtrace::capture() });
                }

                let negotiated_max_pdu = self.max_pdu_length.min(user_variables.max_pdu_length);
                info!(called_ae_title, negotiated_max_pdu, "association established");

                Ok(Association::new(
                    reader_half,
                    writer_half,
                    calling_ae_title,
                    called_ae_title,
                    table,
                    self.max_pdu_length,
                    user_variables.max_pdu_length,
                ))
            }
            Pdu::AssociationRJ { result, source } => Err(Error::Rejected { result, source, backtrace: Backtrace::capture() }),
            Pdu::Abort { .. } => Err(Error::Aborted { backtrace: Backtrace::capture() }),
            other => Err(Error::Unexpected {
                description: other.short_description(),
                backtrace: Backtrace::capture(),
            }),
        }
    }
}
