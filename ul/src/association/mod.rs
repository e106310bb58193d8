//! The association state machine and the established [`Association`]
//! handle used to exchange DIMSE messages (spec §4.2/§4.4).
//!
//! An `Association` owns its transport, its negotiated presentation
//! context table and its negotiated max-PDU length by value — nothing
//! here holds a reference back to an acceptor or a client options
//! struct, so an association outlives the negotiation that produced it
//! without lifetime entanglement.

pub mod client;
pub mod server;

use std::io::{BufReader, BufWriter, Read, Write};

use pacs_core::Uid;
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::pcontext::PresentationContextTable;
use crate::pdu::command::{read_command_set, CommandSet};
use crate::pdu::{self, PDataValue, PDataValueType, Pdu};

/// The association's place in the PS3.8 state machine. Transitions are
/// driven by [`Association`] methods; invalid transitions are rejected
/// by those methods rather than represented here as unreachable states.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AssociationState {
    Idle,
    AwaitingAssociateRq,
    AwaitingAssociateAc,
    Associated,
    AwaitingReleaseRp,
    Released,
    Closed,
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("PDU read failed"))]
    Read {
        source: pdu::reader::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("PDU write failed"))]
    Write {
        source: pdu::writer::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("command group codec failed"))]
    Command {
        source: crate::pdu::command::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("unexpected PDU in state {state:?}: {description}"))]
    UnexpectedPdu {
        state: AssociationState,
        description: String,
        backtrace: Backtrace,
    },
    #[snafu(display("peer aborted the association"))]
    PeerAborted { backtrace: Backtrace },
    #[snafu(display("peer requested release"))]
    PeerReleased { backtrace: Backtrace },
    #[snafu(display("no presentation context with id {id} is established"))]
    UnknownPresentationContext { id: u8, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn read_pdu_from<R: Read>(reader: &mut BufReader<R>, max_pdu_length: u32) -> Result<Pdu> {
    let p = pdu::reader::read_pdu(reader, max_pdu_length).context(ReadSnafu)?;
    debug!(pdu = %p.short_description(), "received PDU");
    Ok(p)
}

fn receive_fragments_from<R: Read>(
    reader: &mut BufReader<R>,
    max_pdu_length: u32,
    expected: PDataValueType,
) -> Result<(u8, Vec<u8>)> {
    let mut buffer = Vec::new();
    let mut context_id = None;
    loop {
        match read_pdu_from(reader, max_pdu_length)? {
            Pdu::PData { data } => {
                for pdv in data {
                    if pdv.value_type != expected {
                        warn!("received a PDV of the wrong kind mid-message, ignoring");
                        continue;
                    }
                    context_id.get_or_insert(pdv.presentation_context_id);
                    buffer.extend_from_slice(&pdv.data);
                    if pdv.is_last {
                        return Ok((context_id.unwrap_or(pdv.presentation_context_id), buffer));
                    }
                }
            }
            Pdu::Abort { .. } => return Err(Error::PeerAborted { backtrace: Backtrace::capture() }),
            Pdu::ReleaseRQ => return Err(Error::PeerReleased { backtrace: Backtrace::capture() }),
            other => {
                return Err(Error::UnexpectedPdu {
                    state: AssociationState::Associated,
                    description: other.short_description(),
                    backtrace: Backtrace::capture(),
                })
            }
        }
    }
}

fn receive_message_from<R: Read>(
    reader: &mut BufReader<R>,
    max_pdu_length: u32,
) -> Result<(u8, CommandSet, Option<Vec<u8>>)> {
    let (context_id, command_bytes) = receive_fragments_from(reader, max_pdu_length, PDataValueType::Command)?;
    let command = read_command_set(&mut &command_bytes[..]).context(CommandSnafu)?;
    let data_set = if command.has_data_set() {
        let (_, data_bytes) = receive_fragments_from(reader, max_pdu_length, PDataValueType::Data)?;
        Some(data_bytes)
    } else {
        None
    };
    Ok((context_id, command, data_set))
}

fn write_pdu_to<W: Write>(writer: &mut BufWriter<W>, p: &Pdu) -> Result<()> {
    debug!(pdu = %p.short_description(), "sending PDU");
    pdu::writer::write_pdu(writer, p).context(WriteSnafu)?;
    writer.flush().map_err(|source| Error::Write {
        source: pdu::writer::Error::Io {
            source,
            backtrace: Backtrace::capture(),
        },
        backtrace: Backtrace::capture(),
    })?;
    Ok(())
}

/// The largest PDV payload a fragment may carry: the smaller of the
/// locally negotiated max-PDU and the peer's accepted max-PDU, minus the
/// 6-byte PDU header minus the 6-byte PDV item header (4-byte length +
/// 2-byte context id/control header).
fn max_pdv_payload_for(max_pdu_length: u32, peer_max_pdu_length: u32) -> usize {
    (max_pdu_length.min(peer_max_pdu_length).max(pdu::MINIMUM_PDU_SIZE) as usize)
        .saturating_sub(pdu::PDU_HEADER_SIZE as usize)
        .saturating_sub(6)
}

#[allow(clippy::too_many_arguments)]
fn send_fragments_to<W: Write>(
    writer: &mut BufWriter<W>,
    max_pdu_length: u32,
    peer_max_pdu_length: u32,
    context_id: u8,
    kind: PDataValueType,
    bytes: &[u8],
) -> Result<()> {
    let chunk_size = max_pdv_payload_for(max_pdu_length, peer_max_pdu_length).max(1);
    if bytes.is_empty() {
        return write_pdu_to(
            writer,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: context_id,
                    value_type: kind,
                    is_last: true,
                    data: Vec::new(),
                }],
            },
        );
    }
    let chunks: Vec<&[u8]> = bytes.chunks(chunk_size).collect();
    let last_index = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        write_pdu_to(
            writer,
            &Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: context_id,
                    value_type: kind,
                    is_last: i == last_index,
                    data: chunk.to_vec(),
                }],
            },
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn send_message_to<W: Write>(
    writer: &mut BufWriter<W>,
    max_pdu_length: u32,
    peer_max_pdu_length: u32,
    presentation_contexts: &PresentationContextTable,
    context_id: u8,
    command: &CommandSet,
    data_set: Option<&[u8]>,
) -> Result<()> {
    ensure!(
        presentation_contexts.transfer_syntax_for(context_id).is_some(),
        UnknownPresentationContextSnafu { id: context_id }
    );

    let command_bytes = crate::pdu::command::encode_command_set(command).context(CommandSnafu)?;
    send_fragments_to(writer, max_pdu_length, peer_max_pdu_length, context_id, PDataValueType::Command, &command_bytes)?;
    if let Some(data) = data_set {
        send_fragments_to(writer, max_pdu_length, peer_max_pdu_length, context_id, PDataValueType::Data, data)?;
    }
    Ok(())
}

/// The read half of a split [`Association`], used by a server dispatch
/// loop running PDU reads on their own thread (spec §4.4) so an
/// in-flight C-CANCEL-RQ can reach a streaming C-FIND/C-MOVE/C-GET
/// handler while it is still producing results.
pub struct AssociationReader<R: Read> {
    reader: BufReader<R>,
    max_pdu_length: u32,
}

impl<R: Read> AssociationReader<R> {
    pub fn receive_message(&mut self) -> Result<(u8, CommandSet, Option<Vec<u8>>)> {
        receive_message_from(&mut self.reader, self.max_pdu_length)
    }
}

/// The write half of a split [`Association`].
pub struct AssociationWriter<W: Write> {
    writer: BufWriter<W>,
    max_pdu_length: u32,
    peer_max_pdu_length: u32,
    presentation_contexts: PresentationContextTable,
}

impl<W: Write> AssociationWriter<W> {
    pub fn send_message(&mut self, context_id: u8, command: &CommandSet, data_set: Option<&[u8]>) -> Result<()> {
        send_message_to(
            &mut self.writer,
            self.max_pdu_length,
            self.peer_max_pdu_length,
            &self.presentation_contexts,
            context_id,
            command,
            data_set,
        )
    }

    pub fn negotiated_abstract_syntax(&self, context_id: u8) -> Option<&Uid> {
        self.presentation_contexts.abstract_syntax_for(context_id)
    }

    /// Respond to a peer-initiated release by sending A-RELEASE-RP.
    pub fn accept_release(&mut self) -> Result<()> {
        write_pdu_to(&mut self.writer, &Pdu::ReleaseRP)
    }

    /// Abort the association immediately (spec §4.2), no release
    /// handshake.
    pub fn abort(&mut self, source: pdu::AbortRQSource) -> Result<()> {
        write_pdu_to(&mut self.writer, &Pdu::Abort { source })
    }
}

/// An established (or closing) association, generic over its transport.
/// `R` and `W` are usually two independent handles onto the same
/// socket (for example the two halves of a `TcpStream::try_clone`),
/// kept separate so reads and writes never need to share a lock.
pub struct Association<R: Read, W: Write> {
    state: AssociationState,
    reader: BufReader<R>,
    writer: BufWriter<W>,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub presentation_contexts: PresentationContextTable,
    pub max_pdu_length: u32,
    pub peer_max_pdu_length: u32,
}

impl<R: Read, W: Write> Association<R, W> {
    pub(crate) fn new(
        reader: R,
        writer: W,
        calling_ae_title: String,
        called_ae_title: String,
        presentation_contexts: PresentationContextTable,
        max_pdu_length: u32,
        peer_max_pdu_length: u32,
    ) -> Self {
        Association {
            state: AssociationState::Associated,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            calling_ae_title,
            called_ae_title,
            presentation_contexts,
            max_pdu_length,
            peer_max_pdu_length,
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    fn write_pdu(&mut self, p: &Pdu) -> Result<()> {
        write_pdu_to(&mut self.writer, p)
    }

    fn read_pdu(&mut self) -> Result<Pdu> {
        read_pdu_from(&mut self.reader, self.max_pdu_length)
    }

    /// Send a DIMSE command, optionally followed by a raw data set, over
    /// the given presentation context, fragmenting as needed (spec §4.4).
    pub fn send_message(
        &mut self,
        context_id: u8,
        command: &CommandSet,
        data_set: Option<&[u8]>,
    ) -> Result<()> {
        send_message_to(
            &mut self.writer,
            self.max_pdu_length,
            self.peer_max_pdu_length,
            &self.presentation_contexts,
            context_id,
            command,
            data_set,
        )
    }

    /// Receive one complete DIMSE message: reassemble command PDVs until
    /// the last-fragment bit is set, decode the command group, then (if
    /// the command indicates a data set follows) reassemble the data
    /// PDVs the same way.
    pub fn receive_message(&mut self) -> Result<(u8, CommandSet, Option<Vec<u8>>)> {
        receive_message_from(&mut self.reader, self.max_pdu_length)
    }

    /// Initiate a graceful release (spec §4.2): send A-RELEASE-RQ and
    /// wait for the peer's A-RELEASE-RP.
    pub fn release(&mut self) -> Result<()> {
        self.state = AssociationState::AwaitingReleaseRp;
        self.write_pdu(&Pdu::ReleaseRQ)?;
        match self.read_pdu()? {
            Pdu::ReleaseRP => {
                self.state = AssociationState::Released;
                Ok(())
            }
            other => Err(Error::UnexpectedPdu {
                state: self.state,
                description: other.short_description(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Respond to a peer-initiated release by sending A-RELEASE-RP.
    pub fn accept_release(&mut self) -> Result<()> {
        self.write_pdu(&Pdu::ReleaseRP)?;
        self.state = AssociationState::Released;
        Ok(())
    }

    /// Abort the association immediately (spec §4.2), no release
    /// handshake. Used on protocol errors and on caller request.
    pub fn abort(&mut self, source: pdu::AbortRQSource) -> Result<()> {
        let result = self.write_pdu(&Pdu::Abort { source });
        self.state = AssociationState::Closed;
        result
    }

    pub fn negotiated_abstract_syntax(&self, context_id: u8) -> Option<&Uid> {
        self.presentation_contexts.abstract_syntax_for(context_id)
    }

    /// Split into independent read and write halves so a server dispatch
    /// loop can run PDU reads on their own thread -- needed so an
    /// in-flight C-CANCEL-RQ can reach a streaming C-FIND/C-MOVE/C-GET
    /// handler while it is still producing results (spec §4.4, §4.5).
    pub fn split(self) -> (AssociationReader<R>, AssociationWriter<W>) {
        (
            AssociationReader {
                reader: self.reader,
                max_pdu_length: self.max_pdu_length,
            },
            AssociationWriter {
                writer: self.writer,
                max_pdu_length: self.max_pdu_length,
                peer_max_pdu_length: self.peer_max_pdu_length,
                presentation_contexts: self.presentation_contexts,
            },
        )
    }
}
