//! Association-level integration tests covering the end-to-end
//! scenarios: a plain verification exchange, and a store followed by a
//! query against the stored instance.
//!
//! These run a real server thread and client on loopback TCP, the way
//! `Acceptor`/`ClientAssociationOptions` are meant to be used together,
//! rather than driving the wire codec directly.

use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pacs_core::tag::tags;
use pacs_core::{Status, Uid};
use pacs_ul::association::server::ServerAssociationOptions;
use pacs_ul::dimse::handler::{FindRequest, FindResult, ServiceHandler, StoreRequest};
use pacs_ul::pdu::command::{dataset_type, CommandField, CommandSet};
use pacs_ul::{ClientAssociationOptions, FullAeAddr};

const VERIFICATION: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";

struct EchoOnlyHandler;

impl ServiceHandler for EchoOnlyHandler {}

#[test]
fn echo_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let options = ServerAssociationOptions::new("ECHO_SCP")
            .with_abstract_syntax(Uid::new(VERIFICATION).unwrap(), [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()]);
        let association = options.establish(stream).unwrap();
        pacs_ul::dimse::serve(association, &EchoOnlyHandler).unwrap();
    });

    let called = FullAeAddr::new("ECHO_SCP", server_addr.to_string());
    let options = ClientAssociationOptions::new("ECHO_SCU", called)
        .with_abstract_syntax(Uid::new(VERIFICATION).unwrap(), [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()]);
    let mut association = options.establish().unwrap();

    let status = pacs_ul::scu::echo(&mut association, 1, &Uid::new(VERIFICATION).unwrap()).unwrap();
    assert_eq!(status, Status::Success);

    association.release().unwrap();
    server_handle.join().unwrap();
}

/// A handler that stores instances in memory, keyed by SOP Instance UID,
/// and answers C-FIND by returning every stored instance whose data set
/// bytes start with the query bytes -- standing in for attribute
/// matching, since a real Identifier data set needs the out-of-scope VR
/// codec.
struct InMemoryStorageHandler {
    instances: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryStorageHandler {
    fn new() -> Self {
        InMemoryStorageHandler { instances: Mutex::new(Vec::new()) }
    }
}

impl ServiceHandler for InMemoryStorageHandler {
    fn on_store(&self, request: StoreRequest) -> Status {
        self.instances.lock().unwrap().push(request.data_set);
        Status::Success
    }

    fn on_find(&self, request: FindRequest, results: &mut dyn FnMut(FindResult)) {
        for data_set in self.instances.lock().unwrap().iter() {
            if data_set.starts_with(&request.data_set) {
                results(FindResult { data_set: data_set.clone(), status: Status::Pending });
            }
        }
    }
}

#[test]
fn store_then_find_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server_addr = listener.local_addr().unwrap();
    let handler = Arc::new(InMemoryStorageHandler::new());
    let acceptor_handler = handler.clone();

    let server_handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let transfer_syntaxes = [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()];
        let options = ServerAssociationOptions::new("STORE_SCP")
            .with_abstract_syntax(Uid::new(CT_IMAGE_STORAGE).unwrap(), transfer_syntaxes.clone())
            .with_abstract_syntax(Uid::new(STUDY_ROOT_FIND).unwrap(), transfer_syntaxes);
        let association = options.establish(stream).unwrap();
        pacs_ul::dimse::serve(association, acceptor_handler.as_ref()).unwrap();
    });

    let called = FullAeAddr::new("STORE_SCP", server_addr.to_string());
    let transfer_syntaxes = [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()];
    let options = ClientAssociationOptions::new("STORE_SCU", called)
        .with_abstract_syntax(Uid::new(CT_IMAGE_STORAGE).unwrap(), transfer_syntaxes.clone())
        .with_abstract_syntax(Uid::new(STUDY_ROOT_FIND).unwrap(), transfer_syntaxes);
    let mut association = options.establish().unwrap();

    let sop_instance = Uid::new("1.2.3.4.5.6.7.8.9").unwrap();
    let data_set = b"PATIENT-001 study data".to_vec();
    let store_status =
        pacs_ul::scu::store(&mut association, 1, &Uid::new(CT_IMAGE_STORAGE).unwrap(), &sop_instance, &data_set).unwrap();
    assert_eq!(store_status, Status::Success);

    let (find_status, matches) =
        pacs_ul::scu::find(&mut association, 2, &Uid::new(STUDY_ROOT_FIND).unwrap(), b"PATIENT-001").unwrap();
    assert!(find_status.is_terminal());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0], data_set);

    let (empty_status, empty_matches) =
        pacs_ul::scu::find(&mut association, 3, &Uid::new(STUDY_ROOT_FIND).unwrap(), b"NO-SUCH-PATIENT").unwrap();
    assert!(empty_status.is_terminal());
    assert!(empty_matches.is_empty());

    association.release().unwrap();
    server_handle.join().unwrap();
}

/// A handler whose C-FIND keeps producing results slowly enough for a
/// C-CANCEL-RQ to reach it mid-stream, and stops as soon as it does.
struct SlowFindHandler {
    total_results: usize,
}

impl ServiceHandler for SlowFindHandler {
    fn on_find(&self, request: FindRequest, results: &mut dyn FnMut(FindResult)) {
        for i in 0..self.total_results {
            if request.cancellation.is_cancelled() {
                return;
            }
            results(FindResult { data_set: format!("match-{i}").into_bytes(), status: Status::Pending });
            thread::sleep(Duration::from_millis(5));
        }
    }
}

#[test]
fn cancel_mid_find_stops_further_results() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server_addr = listener.local_addr().unwrap();

    let server_handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let transfer_syntaxes = [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()];
        let options = ServerAssociationOptions::new("CANCEL_SCP")
            .with_abstract_syntax(Uid::new(STUDY_ROOT_FIND).unwrap(), transfer_syntaxes);
        let association = options.establish(stream).unwrap();
        pacs_ul::dimse::serve(association, &SlowFindHandler { total_results: 200 }).unwrap();
    });

    let called = FullAeAddr::new("CANCEL_SCP", server_addr.to_string());
    let transfer_syntaxes = [Uid::new(IMPLICIT_VR_LITTLE_ENDIAN).unwrap()];
    let options = ClientAssociationOptions::new("CANCEL_SCU", called)
        .with_abstract_syntax(Uid::new(STUDY_ROOT_FIND).unwrap(), transfer_syntaxes);
    let association = options.establish().unwrap();

    let context_id = association
        .presentation_contexts
        .context_for_abstract_syntax(&Uid::new(STUDY_ROOT_FIND).unwrap())
        .unwrap();
    let (mut reader, mut writer) = association.split();

    let message_id = 1;
    let mut find_command = CommandSet::new();
    find_command.put_string(tags::AFFECTED_SOP_CLASS_UID, STUDY_ROOT_FIND);
    find_command.put_u16(tags::COMMAND_FIELD, CommandField::C_FIND_RQ as u16);
    find_command.put_u16(tags::MESSAGE_ID, message_id);
    find_command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::PRESENT);
    writer.send_message(context_id, &find_command, Some(b"ANY")).unwrap();

    let (first_pending_tx, first_pending_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<(usize, Status)>();
    thread::spawn(move || {
        let mut pending_count = 0;
        let mut notified = false;
        loop {
            let (_, response, _) = reader.receive_message().unwrap();
            let status = Status::from_code(response.status().unwrap());
            if !status.is_terminal() {
                pending_count += 1;
                if !notified {
                    notified = true;
                    let _ = first_pending_tx.send(());
                }
            } else {
                let _ = done_tx.send((pending_count, status));
                return;
            }
        }
    });

    first_pending_rx.recv_timeout(Duration::from_secs(5)).expect("expected at least one Pending response");

    let mut cancel_command = CommandSet::new();
    cancel_command.put_u16(tags::COMMAND_FIELD, CommandField::C_CANCEL_RQ as u16);
    cancel_command.put_u16(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id);
    cancel_command.put_u16(tags::COMMAND_DATA_SET_TYPE, dataset_type::ABSENT);
    writer.send_message(context_id, &cancel_command, None).unwrap();

    let (pending_count, final_status) = done_rx.recv_timeout(Duration::from_secs(5)).expect("expected a terminal response");
    assert_eq!(final_status, Status::Cancel);
    assert!(
        pending_count < 200,
        "cancellation should have stopped the stream well short of every result, got {pending_count}"
    );

    server_handle.join().unwrap();
}
