//! A Verification and Storage SCP: accepts associations, answers
//! C-ECHO, and writes every C-STORE data set to a directory under its
//! SOP Instance UID.
//!
//! This binary exists to exercise `pacs-ul`'s server half end to end
//! (spec §4.6); it is deliberately thin. A production PACS storing
//! these instances would parse the data set to index patient/study
//! attributes and extract `PixelData` for on-disk transcoding — both
//! require a DICOM data set codec, which is out of scope here (that
//! layer is an external collaborator's responsibility). What is in
//! scope — which compressed transfer syntaxes this build can actually
//! decode — is logged at startup against the full transfer syntax
//! table.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use pacs_core::{Status, Uid};
use pacs_ul::acceptor::Acceptor;
use pacs_ul::association::server::{AcceptCallingAeTitle, ServerAssociationOptions};
use pacs_ul::dimse::handler::{ServiceHandler, StoreRequest};
use tracing::{info, warn};

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// SOP classes this SCP accepts storage for, beyond the spec §8 E2
/// scenario's CT Image Storage.
const STORAGE_SOP_CLASSES: &[&str] = &[
    "1.2.840.10008.5.1.4.1.1.2",  // CT Image Storage
    "1.2.840.10008.5.1.4.1.1.4",  // MR Image Storage
    "1.2.840.10008.5.1.4.1.1.7",  // Secondary Capture Image Storage
];

#[derive(Parser, Debug)]
#[command(about = "DICOM Verification and Storage SCP", version)]
struct Args {
    /// AE title this SCP answers to.
    #[arg(long, default_value = "STORE_SCP")]
    ae_title: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 11112)]
    port: u16,

    /// Directory received instances are written to, one file per
    /// SOP Instance UID.
    #[arg(short, long, default_value = "./received")]
    out_dir: PathBuf,

    /// Maximum number of concurrent associations.
    #[arg(long, default_value_t = 25)]
    max_associations: usize,

    /// Calling AE titles allowed to associate. If empty, any AE title
    /// is accepted.
    #[arg(long = "allow-ae-title")]
    allowed_calling_ae_titles: Vec<String>,
}

struct StorageHandler {
    out_dir: PathBuf,
    received: AtomicU64,
}

impl StorageHandler {
    fn new(out_dir: PathBuf) -> Self {
        StorageHandler { out_dir, received: AtomicU64::new(0) }
    }
}

impl ServiceHandler for StorageHandler {
    fn on_echo(&self) -> Status {
        info!("answered C-ECHO-RQ");
        Status::Success
    }

    fn on_store(&self, request: StoreRequest) -> Status {
        let file_name = format!("{}.dcm", request.affected_sop_instance_uid.as_str());
        let path = self.out_dir.join(&file_name);

        match fs::write(&path, &request.data_set) {
            Ok(()) => {
                let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    sop_class_uid = %request.affected_sop_class_uid,
                    sop_instance_uid = %request.affected_sop_instance_uid,
                    bytes = request.data_set.len(),
                    total_received = count,
                    "stored instance at {}",
                    path.display()
                );
                Status::Success
            }
            Err(source) => {
                warn!(%source, path = %path.display(), "failed to write received instance");
                Status::Failure(pacs_core::status::codes::FAILURE_OUT_OF_RESOURCES)
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    fs::create_dir_all(&args.out_dir).unwrap_or_else(|source| {
        eprintln!("failed to create output directory {}: {source}", args.out_dir.display());
        std::process::exit(1);
    });

    let transfer_syntaxes: Vec<Uid> = pacs_transfer_syntax_registry::REGISTRY
        .iter()
        .map(|ts| ts.uid().clone())
        .collect();

    for ts in pacs_transfer_syntax_registry::REGISTRY.iter().filter(|ts| ts.is_encapsulated()) {
        let decodable = pacs_pixeldata::codec_for(ts.uid().as_str()).is_some();
        info!(transfer_syntax = %ts.uid(), name = ts.name(), decodable, "compressed transfer syntax");
    }

    let mut options = ServerAssociationOptions::new(args.ae_title.as_str()).with_abstract_syntax(
        Uid::new(VERIFICATION_SOP_CLASS).expect("well-known UID"),
        transfer_syntaxes.clone(),
    );
    for sop_class in STORAGE_SOP_CLASSES {
        options = options.with_abstract_syntax(
            Uid::new(*sop_class).expect("well-known UID"),
            transfer_syntaxes.clone(),
        );
    }
    if !args.allowed_calling_ae_titles.is_empty() {
        options = options.with_access_control(AcceptCallingAeTitle::new(args.allowed_calling_ae_titles.clone()));
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let acceptor = Acceptor::bind(&addr, options, args.max_associations).unwrap_or_else(|source| {
        eprintln!("failed to bind {addr}: {source}");
        std::process::exit(1);
    });
    info!(%addr, ae_title = %args.ae_title, "listening");

    let handler = Arc::new(StorageHandler::new(args.out_dir));
    acceptor.serve_forever(handler);
}
