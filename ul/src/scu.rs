//! SCU (service class user) operations layered on top of an established
//! [`Association`] (spec §4.7).
//!
//! Each method here is a single DIMSE exchange: encode a request
//! command (optionally with a data set), send it, then decode the
//! matching response. C-FIND/C-MOVE/C-GET return every intermediate
//! Pending response as well as the final one, since callers need the
//! sub-operation counters along the way.

use std::io::{Read, Write};

use pacs_core::tag::tags;
use pacs_core::{Status, Uid};
use snafu::{Backtrace, ResultExt, Snafu};

use crate::association::Association;
use crate::dimse::handler::SubOpProgress;
use crate::pdu::command::{dataset_type, CommandField, CommandSet};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("association I/O failed"))]
    Association {
        source: crate::association::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("no presentation context is negotiated for abstract syntax {abstract_syntax}"))]
    NoPresentationContext {
        abstract_syntax: String,
        backtrace: Backtrace,
    },
    #[snafu(display("response carried no recognizable status"))]
    MissingStatus { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn context_for<R: Read, W: Write>(
    association: &Association<R, W>,
    abstract_syntax: &Uid,
) -> Result<u8> {
    association
        .presentation_contexts
        .context_for_abstract_syntax(abstract_syntax)
        .ok_or_else(|| Error::NoPresentationContext {
            abstract_syntax: abstract_syntax.as_str().to_string(),
            backtrace: Backtrace::capture(),
        })
}

/// Send a C-ECHO-RQ and return the response status (spec §4.7 E1).
pub fn echo<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
) -> Result<Status> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_ECHO_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::ABSENT);

    association
        .send_message(context_id, &command, None)
        .context(AssociationSnafu)?;
    let (_, response, _) = association.receive_message().context(AssociationSnafu)?;
    status_of(&response)
}

/// Send a C-STORE-RQ with the given data set (spec §4.7 E2).
pub fn store<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
    sop_instance_uid: &Uid,
    data_set: &[u8],
) -> Result<Status> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_STORE_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    command.put_string(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid.as_str());

    association
        .send_message(context_id, &command, Some(data_set))
        .context(AssociationSnafu)?;
    let (_, response, _) = association.receive_message().context(AssociationSnafu)?;
    status_of(&response)
}

/// Send a C-FIND-RQ and collect every matching data set until a
/// terminal (non-Pending) status arrives (spec §4.7).
pub fn find<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
    query: &[u8],
) -> Result<(Status, Vec<Vec<u8>>)> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_FIND_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);

    association
        .send_message(context_id, &command, Some(query))
        .context(AssociationSnafu)?;

    let mut matches = Vec::new();
    loop {
        let (_, response, data) = association.receive_message().context(AssociationSnafu)?;
        let status = status_of(&response)?;
        if let Some(data) = data {
            matches.push(data);
        }
        if status.is_terminal() {
            return Ok((status, matches));
        }
    }
}

/// Send a C-MOVE-RQ to `destination_ae_title` and collect the
/// sub-operation progress of every intermediate response (spec §4.7).
pub fn move_instances<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
    destination_ae_title: &str,
    query: &[u8],
) -> Result<(Status, Vec<SubOpProgress>)> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_MOVE_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    command.put_string(tags::MOVE_DESTINATION, destination_ae_title);

    association
        .send_message(context_id, &command, Some(query))
        .context(AssociationSnafu)?;

    let mut progress_log = Vec::new();
    loop {
        let (_, response, _) = association.receive_message().context(AssociationSnafu)?;
        let status = status_of(&response)?;
        progress_log.push(SubOpProgress {
            remaining: response.get_u16(tags::NUMBER_OF_REMAINING_SUB_OPERATIONS).unwrap_or(0),
            completed: response.get_u16(tags::NUMBER_OF_COMPLETED_SUB_OPERATIONS).unwrap_or(0),
            failed: response.get_u16(tags::NUMBER_OF_FAILED_SUB_OPERATIONS).unwrap_or(0),
            warning: response.get_u16(tags::NUMBER_OF_WARNING_SUB_OPERATIONS).unwrap_or(0),
        });
        if status.is_terminal() {
            return Ok((status, progress_log));
        }
    }
}

/// Send a C-CANCEL-RQ for a previously issued request's message id
/// (spec §4.4). There is no response PDU for a cancel request itself.
pub fn cancel<R: Read, W: Write>(
    association: &mut Association<R, W>,
    context_id: u8,
    message_id_being_cancelled: u16,
) -> Result<()> {
    let mut command = CommandSet::new();
    command.put_u16(tags::COMMAND_FIELD, CommandField::C_CANCEL_RQ as u16);
    command.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id_being_cancelled);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::ABSENT);
    association
        .send_message(context_id, &command, None)
        .context(AssociationSnafu)
}

/// Send an N-CREATE-RQ (spec §4.7, used for MPPS).
pub fn n_create<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
    affected_sop_instance_uid: Option<&Uid>,
    data_set: &[u8],
) -> Result<Status> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::AFFECTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::N_CREATE_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    if let Some(uid) = affected_sop_instance_uid {
        command.put_string(tags::AFFECTED_SOP_INSTANCE_UID, uid.as_str());
    }

    association
        .send_message(context_id, &command, Some(data_set))
        .context(AssociationSnafu)?;
    let (_, response, _) = association.receive_message().context(AssociationSnafu)?;
    status_of(&response)
}

/// Send an N-SET-RQ (spec §4.7, used for MPPS).
pub fn n_set<R: Read, W: Write>(
    association: &mut Association<R, W>,
    message_id: u16,
    abstract_syntax: &Uid,
    requested_sop_instance_uid: &Uid,
    data_set: &[u8],
) -> Result<Status> {
    let context_id = context_for(association, abstract_syntax)?;
    let mut command = CommandSet::new();
    command.put_string(tags::REQUESTED_SOP_CLASS_UID, abstract_syntax.as_str());
    command.put_u16(tags::COMMAND_FIELD, CommandField::N_SET_RQ as u16);
    command.put_u16(tags::MESSAGE_ID, message_id);
    command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    command.put_string(tags::REQUESTED_SOP_INSTANCE_UID, requested_sop_instance_uid.as_str());

    association
        .send_message(context_id, &command, Some(data_set))
        .context(AssociationSnafu)?;
    let (_, response, _) = association.receive_message().context(AssociationSnafu)?;
    status_of(&response)
}

fn status_of(response: &CommandSet) -> Result<Status> {
    response
        .status()
        .map(Status::from_code)
        .ok_or(Error::MissingStatus { backtrace: Backtrace::capture() })
}
