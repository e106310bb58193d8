//! The DIMSE dispatcher: decodes one incoming command at a time on an
//! established association and routes it to a [`handler::ServiceHandler`]
//! (spec §4.4, §4.5).

pub mod handler;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use pacs_core::tag::tags;
use pacs_core::{Status, Uid};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::association::{Association, AssociationWriter};
use crate::pdu::command::{dataset_type, CommandField, CommandSet};

use handler::{
    Cancellation, FindRequest, GetRequest, MoveRequest, NCreateRequest, NSetRequest,
    ServiceHandler, StoreRequest, SubOpProgress,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("association I/O failed"))]
    Association {
        source: crate::association::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("received a command with no recognizable CommandField"))]
    UnknownCommandField { backtrace: Backtrace },
    #[snafu(display("command group codec failed"))]
    Command {
        source: crate::pdu::command::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("no abstract syntax is negotiated for presentation context {id}"))]
    NoAbstractSyntax { id: u8, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type Cancellations = Arc<Mutex<HashMap<u16, Cancellation>>>;

/// One decoded unit of work handed from the background reader to the
/// dispatch loop.
enum ReaderEvent {
    Message {
        context_id: u8,
        field: CommandField,
        command: CommandSet,
        data_set: Option<Vec<u8>>,
    },
    PeerAborted,
    PeerReleased,
    Error(Error),
}

/// Serve DIMSE requests on an established association until the peer
/// releases or aborts it, or an unrecoverable error occurs.
///
/// Reading is done on a dedicated background thread that demultiplexes
/// the incoming PDU stream: a C-CANCEL-RQ is applied directly to the
/// matching cancellation token and never reaches the dispatch loop,
/// while every other command is forwarded over a channel. This is what
/// lets a C-CANCEL-RQ reach a streaming C-FIND/C-MOVE/C-GET handler
/// while it is still producing results on the main thread, rather than
/// only being observable once that handler has already returned.
pub fn serve<R, W>(association: Association<R, W>, handler: &dyn ServiceHandler) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write,
{
    let (mut reader, mut writer) = association.split();
    let cancellations: Cancellations = Arc::new(Mutex::new(HashMap::new()));
    let reader_cancellations = Arc::clone(&cancellations);

    let (tx, rx) = mpsc::channel::<ReaderEvent>();
    std::thread::spawn(move || loop {
        let (context_id, command, data_set) = match reader.receive_message() {
            Ok(message) => message,
            Err(crate::association::Error::PeerAborted { .. }) => {
                let _ = tx.send(ReaderEvent::PeerAborted);
                return;
            }
            Err(crate::association::Error::PeerReleased { .. }) => {
                let _ = tx.send(ReaderEvent::PeerReleased);
                return;
            }
            Err(source) => {
                let _ = tx.send(ReaderEvent::Error(Error::Association { source, backtrace: Backtrace::capture() }));
                return;
            }
        };

        let field = match command.command_field().and_then(CommandField::from_u16) {
            Some(field) => field,
            None => {
                let _ = tx.send(ReaderEvent::Error(Error::UnknownCommandField { backtrace: Backtrace::capture() }));
                return;
            }
        };

        if matches!(field, CommandField::C_CANCEL_RQ) {
            if let Some(message_id) = command.message_id_being_responded_to() {
                if let Some(token) = reader_cancellations.lock().unwrap().get(&message_id) {
                    token.cancel();
                }
            }
            continue;
        }

        if tx.send(ReaderEvent::Message { context_id, field, command, data_set }).is_err() {
            return;
        }
    });

    loop {
        match rx.recv() {
            Ok(ReaderEvent::Message { context_id, field, command, data_set }) => {
                let abstract_syntax = writer
                    .negotiated_abstract_syntax(context_id)
                    .context(NoAbstractSyntaxSnafu { id: context_id })?
                    .clone();
                dispatch(&mut writer, handler, &cancellations, context_id, &abstract_syntax, field, command, data_set)?;
            }
            Ok(ReaderEvent::PeerAborted) => {
                debug!("peer aborted; ending dispatch loop");
                return Ok(());
            }
            Ok(ReaderEvent::PeerReleased) => {
                debug!("peer released; ending dispatch loop");
                return writer.accept_release().context(AssociationSnafu);
            }
            Ok(ReaderEvent::Error(err)) => return Err(err),
            Err(_) => {
                // The reader thread ended without sending a terminal event,
                // which only happens if it panicked; treat as a clean end.
                return Ok(());
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch<W: Write>(
    writer: &mut AssociationWriter<W>,
    handler: &dyn ServiceHandler,
    cancellations: &Cancellations,
    context_id: u8,
    abstract_syntax: &Uid,
    field: CommandField,
    command: CommandSet,
    data_set: Option<Vec<u8>>,
) -> Result<()> {
    let message_id = command.message_id().unwrap_or(0);

    match field {
        CommandField::C_ECHO_RQ => {
            let status = handler.on_echo();
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::C_ECHO_RSP,
                message_id,
                status,
                None,
            )
        }
        CommandField::C_STORE_RQ => {
            let sop_class = command
                .get_string(tags::AFFECTED_SOP_CLASS_UID)
                .and_then(|s| Uid::new(s).ok())
                .unwrap_or_else(|| abstract_syntax.clone());
            let sop_instance = command
                .get_string(tags::AFFECTED_SOP_INSTANCE_UID)
                .and_then(|s| Uid::new(s).ok());
            let status = match sop_instance {
                Some(sop_instance) => handler.on_store(StoreRequest {
                    affected_sop_class_uid: sop_class,
                    affected_sop_instance_uid: sop_instance,
                    data_set: data_set.unwrap_or_default(),
                }),
                None => Status::Failure(pacs_core::status::codes::FAILURE_CANNOT_UNDERSTAND),
            };
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::C_STORE_RSP,
                message_id,
                status,
                None,
            )
        }
        CommandField::C_FIND_RQ => {
            let token = Cancellation::new();
            cancellations.lock().unwrap().insert(message_id, token.clone());

            let mut send_error = None;
            handler.on_find(
                FindRequest { data_set: data_set.unwrap_or_default(), cancellation: token.clone() },
                &mut |result| {
                    if send_error.is_some() {
                        return;
                    }
                    if let Err(err) = send_find_result(writer, context_id, abstract_syntax, message_id, &result) {
                        send_error = Some(err);
                    }
                },
            );
            cancellations.lock().unwrap().remove(&message_id);
            if let Some(err) = send_error {
                return Err(err);
            }

            let final_status = if token.is_cancelled() { Status::Cancel } else { Status::Success };
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::C_FIND_RSP,
                message_id,
                final_status,
                None,
            )
        }
        CommandField::C_MOVE_RQ => {
            let destination = command
                .get_string(tags::MOVE_DESTINATION)
                .unwrap_or_default();
            let token = Cancellation::new();
            cancellations.lock().unwrap().insert(message_id, token.clone());

            let mut last_progress = SubOpProgress::default();
            let mut send_error = None;
            let final_status = handler.on_move(
                MoveRequest {
                    data_set: data_set.unwrap_or_default(),
                    destination_ae_title: destination,
                    cancellation: token,
                },
                &mut |progress| {
                    last_progress = progress;
                    if send_error.is_some() {
                        return;
                    }
                    if let Err(err) = send_sub_op_progress(
                        writer,
                        context_id,
                        abstract_syntax,
                        CommandField::C_MOVE_RSP,
                        message_id,
                        Status::Pending,
                        progress,
                    ) {
                        send_error = Some(err);
                    }
                },
            );
            cancellations.lock().unwrap().remove(&message_id);
            if let Some(err) = send_error {
                return Err(err);
            }

            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::C_MOVE_RSP,
                message_id,
                final_status,
                Some(last_progress),
            )
        }
        CommandField::C_GET_RQ => {
            let token = Cancellation::new();
            cancellations.lock().unwrap().insert(message_id, token.clone());

            let mut completed = 0u16;
            let mut send_error = None;
            handler.on_get(
                GetRequest { data_set: data_set.unwrap_or_default(), cancellation: token.clone() },
                &mut |instance| {
                    if send_error.is_some() {
                        return;
                    }
                    let outcome = send_sub_operation(
                        writer,
                        context_id,
                        abstract_syntax,
                        message_id,
                        &instance,
                    )
                    .and_then(|()| {
                        completed += 1;
                        send_sub_op_progress(
                            writer,
                            context_id,
                            abstract_syntax,
                            CommandField::C_GET_RSP,
                            message_id,
                            Status::Pending,
                            SubOpProgress { remaining: 0, completed, failed: 0, warning: 0 },
                        )
                    });
                    if let Err(err) = outcome {
                        send_error = Some(err);
                    }
                },
            );
            cancellations.lock().unwrap().remove(&message_id);
            if let Some(err) = send_error {
                return Err(err);
            }

            let final_status = if token.is_cancelled() { Status::Cancel } else { Status::Success };
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::C_GET_RSP,
                message_id,
                final_status,
                None,
            )
        }
        CommandField::N_CREATE_RQ => {
            let sop_class = command
                .get_string(tags::AFFECTED_SOP_CLASS_UID)
                .and_then(|s| Uid::new(s).ok())
                .unwrap_or_else(|| abstract_syntax.clone());
            let sop_instance = command
                .get_string(tags::AFFECTED_SOP_INSTANCE_UID)
                .and_then(|s| Uid::new(s).ok());
            let status = handler.on_n_create(NCreateRequest {
                affected_sop_class_uid: sop_class,
                affected_sop_instance_uid: sop_instance,
                data_set: data_set.unwrap_or_default(),
            });
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::N_CREATE_RSP,
                message_id,
                status,
                None,
            )
        }
        CommandField::N_SET_RQ => {
            let sop_class = command
                .get_string(tags::REQUESTED_SOP_CLASS_UID)
                .and_then(|s| Uid::new(s).ok())
                .unwrap_or_else(|| abstract_syntax.clone());
            let sop_instance = command.get_string(tags::REQUESTED_SOP_INSTANCE_UID);
            let status = match sop_instance.and_then(|s| Uid::new(s).ok()) {
                Some(sop_instance) => handler.on_n_set(NSetRequest {
                    requested_sop_class_uid: sop_class,
                    requested_sop_instance_uid: sop_instance,
                    data_set: data_set.unwrap_or_default(),
                }),
                None => Status::Failure(pacs_core::status::codes::FAILURE_CANNOT_UNDERSTAND),
            };
            respond(
                writer,
                context_id,
                abstract_syntax,
                CommandField::N_SET_RSP,
                message_id,
                status,
                None,
            )
        }
        other => {
            warn!(?other, "received a response command field as a request, ignoring");
            Ok(())
        }
    }
}

fn respond<W: Write>(
    writer: &mut AssociationWriter<W>,
    context_id: u8,
    abstract_syntax: &Uid,
    field: CommandField,
    message_id: u16,
    status: Status,
    progress: Option<SubOpProgress>,
) -> Result<()> {
    let mut response = CommandSet::new();
    response.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    response.put_u16(tags::COMMAND_FIELD, field as u16);
    response.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id);
    response.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::ABSENT);
    response.put_u16(tags::STATUS, status.code());
    if let Some(progress) = progress {
        response.put_u16(tags::NUMBER_OF_REMAINING_SUB_OPERATIONS, progress.remaining);
        response.put_u16(tags::NUMBER_OF_COMPLETED_SUB_OPERATIONS, progress.completed);
        response.put_u16(tags::NUMBER_OF_FAILED_SUB_OPERATIONS, progress.failed);
        response.put_u16(tags::NUMBER_OF_WARNING_SUB_OPERATIONS, progress.warning);
    }
    writer.send_message(context_id, &response, None).context(AssociationSnafu)
}

#[allow(clippy::too_many_arguments)]
fn send_sub_op_progress<W: Write>(
    writer: &mut AssociationWriter<W>,
    context_id: u8,
    abstract_syntax: &Uid,
    field: CommandField,
    message_id: u16,
    status: Status,
    progress: SubOpProgress,
) -> Result<()> {
    respond(writer, context_id, abstract_syntax, field, message_id, status, Some(progress))
}

fn send_find_result<W: Write>(
    writer: &mut AssociationWriter<W>,
    context_id: u8,
    abstract_syntax: &Uid,
    message_id: u16,
    result: &handler::FindResult,
) -> Result<()> {
    let mut response = CommandSet::new();
    response.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    response.put_u16(tags::COMMAND_FIELD, CommandField::C_FIND_RSP as u16);
    response.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id);
    response.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    response.put_u16(tags::STATUS, result.status.code());
    writer
        .send_message(context_id, &response, Some(result.data_set.as_slice()))
        .context(AssociationSnafu)
}

fn send_sub_operation<W: Write>(
    writer: &mut AssociationWriter<W>,
    context_id: u8,
    abstract_syntax: &Uid,
    message_id: u16,
    instance: &StoreRequest,
) -> Result<()> {
    writer
        .send_message(
            context_id,
            &store_sub_operation_command(abstract_syntax, message_id, &instance.affected_sop_instance_uid),
            Some(instance.data_set.as_slice()),
        )
        .context(AssociationSnafu)
}

fn store_sub_operation_command(
    abstract_syntax: &Uid,
    message_id: u16,
    sop_instance_uid: &Uid,
) -> CommandSet {
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_STORE_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    command.put_string(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid.as_str());
    command
}
