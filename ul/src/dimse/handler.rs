//! The service handler capability set (spec §4.5, §9 Design Notes).
//!
//! The original system wired services together with per-operation
//! callback setters (`setStorageCallback`, `setQueryCallback`, ...),
//! which let a service run half-configured and made the wiring order
//! matter. Here a single object is handed to the acceptor at
//! construction time and implements only the operations it supports;
//! default method bodies answer with "not supported" so a handler can
//! opt into exactly the DIMSE services it implements.

use pacs_core::{Status, Uid};

/// Progress of a set of C-MOVE/C-GET sub-operations (spec §4.5, Open
/// Question: warnings are counted separately from completions).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct SubOpProgress {
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

impl SubOpProgress {
    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// A cooperative cancellation flag threaded through long-running
/// C-FIND/C-MOVE/C-GET handlers, set when a C-CANCEL-RQ arrives for the
/// request's message id.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// A single matching result yielded by a C-FIND/MWL query handler.
pub struct FindResult {
    pub data_set: Vec<u8>,
    pub status: Status,
}

/// A request to store an instance via C-STORE.
pub struct StoreRequest {
    pub affected_sop_class_uid: Uid,
    pub affected_sop_instance_uid: Uid,
    pub data_set: Vec<u8>,
}

/// A request to query via C-FIND (or an MWL query on its own abstract
/// syntax).
pub struct FindRequest {
    pub data_set: Vec<u8>,
    pub cancellation: Cancellation,
}

/// A request to retrieve via C-MOVE, naming the destination AE.
pub struct MoveRequest {
    pub data_set: Vec<u8>,
    pub destination_ae_title: String,
    pub cancellation: Cancellation,
}

/// A request to retrieve via C-GET, answered on the same association.
pub struct GetRequest {
    pub data_set: Vec<u8>,
    pub cancellation: Cancellation,
}

/// A request to create an MPPS instance via N-CREATE.
pub struct NCreateRequest {
    pub affected_sop_class_uid: Uid,
    pub affected_sop_instance_uid: Option<Uid>,
    pub data_set: Vec<u8>,
}

/// A request to update an MPPS instance via N-SET.
pub struct NSetRequest {
    pub requested_sop_class_uid: Uid,
    pub requested_sop_instance_uid: Uid,
    pub data_set: Vec<u8>,
}

/// The capability set an application entity exposes to incoming
/// associations. Every method has a default "not supported" answer, so
/// a handler only needs to override the services it implements.
pub trait ServiceHandler: Send + Sync {
    fn on_echo(&self) -> Status {
        Status::Success
    }

    fn on_store(&self, _request: StoreRequest) -> Status {
        Status::Failure(pacs_core::status::codes::FAILURE_SOP_CLASS_NOT_SUPPORTED)
    }

    fn on_find(&self, _request: FindRequest, _results: &mut dyn FnMut(FindResult)) {}

    fn on_move(
        &self,
        _request: MoveRequest,
        _progress: &mut dyn FnMut(SubOpProgress),
    ) -> Status {
        Status::Failure(pacs_core::status::codes::FAILURE_SOP_CLASS_NOT_SUPPORTED)
    }

    fn on_get(&self, _request: GetRequest, _instances: &mut dyn FnMut(StoreRequest)) {}

    fn on_n_create(&self, _request: NCreateRequest) -> Status {
        Status::Failure(pacs_core::status::codes::FAILURE_SOP_CLASS_NOT_SUPPORTED)
    }

    fn on_n_set(&self, _request: NSetRequest) -> Status {
        Status::Failure(pacs_core::status::codes::FAILURE_SOP_CLASS_NOT_SUPPORTED)
    }

    /// A modality worklist query is a C-FIND against a dedicated
    /// abstract syntax; kept as its own method so a handler can
    /// implement MWL semantics without overloading `on_find`.
    fn on_mwl_find(&self, request: FindRequest, results: &mut dyn FnMut(FindResult)) {
        self.on_find(request, results)
    }
}
