//! Acceptor-side association negotiation (spec §4.2 steps 1-4, §4.6).
//!
//! [`ServerAssociationOptions`] describes what this application entity
//! is willing to accept. The called AE title is always checked against
//! this entity's own title before anything else; [`AccessControl`] then
//! decides whether a particular calling AE title may associate at all,
//! decoupled from presentation context negotiation so a deployment can
//! swap in its own policy without touching the negotiation logic.

use std::net::TcpStream;

use pacs_core::Uid;
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{info, warn};

use crate::pcontext::{PresentationContext, PresentationContextTable};
use crate::pdu::{
    self, AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource,
    PresentationContextResult, PresentationContextResultReason, UserVariables,
};

fn rejection_for_mismatched_called_ae_title(
    this_ae_title: &str,
    called_ae_title: &str,
) -> std::result::Result<(), AssociationRJSource> {
    if this_ae_title == called_ae_title {
        Ok(())
    } else {
        Err(AssociationRJSource::ServiceUser(
            AssociationRJServiceUserReason::CalledAeTitleNotRecognized,
        ))
    }
}

use super::Association;

pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to accept the incoming connection"))]
    Accept {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU exchange failed during negotiation"))]
    Pdu {
        source: super::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("expected an A-ASSOCIATE-RQ, got: {description}"))]
    NotAnAssociateRq { description: String, backtrace: Backtrace },
    #[snafu(display("the peer was rejected: {reason}"))]
    Rejected { reason: String, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A policy deciding whether a calling AE title may associate at all,
/// evaluated before presentation contexts are negotiated.
pub trait AccessControl: Send + Sync {
    fn check(&self, calling_ae_title: &str) -> std::result::Result<(), AssociationRJSource>;
}

/// Accepts every calling AE title.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check(&self, _calling_ae_title: &str) -> std::result::Result<(), AssociationRJSource> {
        Ok(())
    }
}

/// Accepts only calling AE titles present in an explicit allow-list.
/// This checks the *requester's* AE title (the calling AE title carried
/// in the A-ASSOCIATE-RQ), not this application entity's own title --
/// that comparison is made separately in [`ServerAssociationOptions::establish`].
#[derive(Debug, Clone)]
pub struct AcceptCallingAeTitle {
    allowed: Vec<String>,
}

impl AcceptCallingAeTitle {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        AcceptCallingAeTitle {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessControl for AcceptCallingAeTitle {
    fn check(&self, calling_ae_title: &str) -> std::result::Result<(), AssociationRJSource> {
        if self.allowed.iter().any(|ae| ae == calling_ae_title) {
            Ok(())
        } else {
            Err(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CallingAeTitleNotRecognized,
            ))
        }
    }
}

/// One abstract syntax this application entity supports, together with
/// the transfer syntaxes it can negotiate for it, in preference order.
#[derive(Clone, Debug)]
pub struct SupportedAbstractSyntax {
    pub uid: Uid,
    pub transfer_syntaxes: Vec<Uid>,
}

/// What an acceptor is willing to negotiate.
pub struct ServerAssociationOptions {
    pub ae_title: String,
    pub access_control: Box<dyn AccessControl>,
    pub supported_abstract_syntaxes: Vec<SupportedAbstractSyntax>,
    pub max_pdu_length: u32,
    pub implementation_class_uid: String,
    pub implementation_version_name: Option<String>,
}

impl ServerAssociationOptions {
    pub fn new(ae_title: impl Into<String>) -> Self {
        ServerAssociationOptions {
            ae_title: ae_title.into(),
            access_control: Box::new(AcceptAny),
            supported_abstract_syntaxes: Vec::new(),
            max_pdu_length: pdu::DEFAULT_MAX_PDU,
            implementation_class_uid: "1.2.826.0.1.3680043.9.7433.1.1".to_string(),
            implementation_version_name: Some("PACS_CORE_001".to_string()),
        }
    }

    pub fn with_access_control(mut self, access_control: impl AccessControl + 'static) -> Self {
        self.access_control = Box::new(access_control);
        self
    }

    pub fn with_abstract_syntax(
        mut self,
        uid: Uid,
        transfer_syntaxes: impl IntoIterator<Item = Uid>,
    ) -> Self {
        self.supported_abstract_syntaxes.push(SupportedAbstractSyntax {
            uid,
            transfer_syntaxes: transfer_syntaxes.into_iter().collect(),
        });
        self
    }

    fn supported_for(&self, abstract_syntax: &str) -> Option<&SupportedAbstractSyntax> {
        self.supported_abstract_syntaxes
            .iter()
            .find(|s| s.uid.as_str() == abstract_syntax)
    }

    /// Negotiate an association over an already-accepted TCP connection.
    /// On rejection, an A-ASSOCIATE-RJ is sent to the peer before
    /// returning an error.
    pub fn establish(
        &self,
        stream: TcpStream,
    ) -> Result<Association<TcpStream, TcpStream>> {
        let reader_half = stream.try_clone().context(AcceptSnafu)?;
        let writer_half = stream;
        let mut reader = std::io::BufReader::new(reader_half.try_clone().context(AcceptSnafu)?);
        let mut writer = std::io::BufWriter::new(writer_half.try_clone().context(AcceptSnafu)?);

        let rq = pdu::reader::read_pdu(&mut reader, pdu::MAXIMUM_PDU_SIZE)
            .map_err(|source| Error::Pdu {
                source: super::Error::Read { source, backtrace: Backtrace::capture() },
                backtrace: Backtrace::capture(),
            })?;

        let (calling_ae_title, called_ae_title, proposed_contexts, peer_user_variables) = match rq
        {
            pdu::Pdu::AssociationRQ {
                calling_ae_title,
                called_ae_title,
                presentation_contexts,
                user_variables,
                ..
            } => (calling_ae_title, called_ae_title, presentation_contexts, user_variables),
            other => {
                return Err(Error::NotAnAssociateRq {
                    description: other.short_description(),
                    backtrace: Backtrace::capture(),
                })
            }
        };

        if let Err(rj_source) =
            rejection_for_mismatched_called_ae_title(&self.ae_title, &called_ae_title)
        {
            warn!(called_ae_title, this_ae_title = %self.ae_title, "rejecting association: called AE title not recognized");
            let _ = pdu::writer::write_pdu(
                &mut writer,
                &pdu::Pdu::AssociationRJ {
                    result: AssociationRJResult::Permanent,
                    source: rj_source,
                },
            );
            let _ = std::io::Write::flush(&mut writer);
            return Err(Error::Rejected {
                reason: format!("called AE title {called_ae_title} not recognized"),
                backtrace: Backtrace::capture(),
            });
        }

        if let Err(rj_source) = self.access_control.check(&calling_ae_title) {
            warn!(calling_ae_title, "rejecting association: access control");
            let _ = pdu::writer::write_pdu(
                &mut writer,
                &pdu::Pdu::AssociationRJ {
                    result: AssociationRJResult::Permanent,
                    source: rj_source,
                },
            );
            let _ = std::io::Write::flush(&mut writer);
            return Err(Error::Rejected {
                reason: format!("calling AE title {calling_ae_title} not permitted"),
                backtrace: Backtrace::capture(),
            });
        }

        let mut results = Vec::with_capacity(proposed_contexts.len());
        let mut table = PresentationContextTable::new();
        for proposed in &proposed_contexts {
            let accepted = self.supported_for(&proposed.abstract_syntax).and_then(|support| {
                proposed
                    .transfer_syntaxes
                    .iter()
                    .find(|ts| support.transfer_syntaxes.iter().any(|s| s.as_str() == ts.as_str()))
            });

            match accepted {
                Some(transfer_syntax) => {
                    results.push(PresentationContextResult {
                        id: proposed.id,
                        reason: PresentationContextResultReason::Acceptance,
                        transfer_syntax: transfer_syntax.clone(),
                    });
                    if let (Ok(abstract_uid), Ok(transfer_uid)) = (
                        Uid::new(proposed.abstract_syntax.clone()),
                        Uid::new(transfer_syntax.clone()),
                    ) {
                        table.insert(PresentationContext {
                            id: proposed.id,
                            abstract_syntax: abstract_uid,
                            transfer_syntax: transfer_uid,
                        });
                    }
                }
                None => {
                    let reason = if self.supported_for(&proposed.abstract_syntax).is_none() {
                        PresentationContextResultReason::AbstractSyntaxNotSupported
                    } else {
                        PresentationContextResultReason::TransferSyntaxesNotSupported
                    };
                    results.push(PresentationContextResult {
                        id: proposed.id,
                        reason,
                        transfer_syntax: String::new(),
                    });
                }
            }
        }

        let negotiated_max_pdu = self.max_pdu_length.min(peer_user_variables.max_pdu_length);

        pdu::writer::write_pdu(
            &mut writer,
            &pdu::Pdu::AssociationAC {
                protocol_version: 1,
                calling_ae_title: calling_ae_title.clone(),
                called_ae_title: called_ae_title.clone(),
                application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
                presentation_contexts: results,
                user_variables: UserVariables {
                    max_pdu_length: negotiated_max_pdu,
                    implementation_class_uid: self.implementation_class_uid.clone(),
                    implementation_version_name: self.implementation_version_name.clone(),
                },
            },
        )
        .map_err(|source| Error::Pdu {
            source: super::Error::Write { source, backtrace: Backtrace::capture() },
            backtrace: Backtrace::capture(),
        })?;
        std::io::Write::flush(&mut writer).context(AcceptSnafu)?;

        info!(calling_ae_title, called_ae_title, negotiated_max_pdu, "association accepted");

        Ok(Association::new(
            reader_half,
            writer_half,
            calling_ae_title,
            called_ae_title,
            table,
            negotiated_max_pdu,
            peer_user_variables.max_pdu_length,
        ))
    }
}
