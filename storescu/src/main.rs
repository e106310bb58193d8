//! A DICOM SCU command line client: C-ECHO, C-STORE, and C-FIND against
//! a remote application entity, exercising `pacs-ul`'s client half
//! (spec §4.7) end to end.
//!
//! `store` sends a data set's worth of bytes as-is; building a real
//! DICOM data set (File Meta group plus VR-encoded attributes) is a
//! data set codec's job, which is out of scope for this workspace (an
//! external collaborator's responsibility, spec §1). To still exercise
//! `pacs-pixeldata` end to end, `store` can compress a raw pixel buffer
//! with the codec registered for the chosen transfer syntax and send
//! the compressed bytes as the data set placeholder — a real SCU would
//! instead encapsulate that compressed fragment inside the `PixelData`
//! element of a fully encoded data set.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pacs_core::Uid;
use pacs_pixeldata::{CompressionOptions, ImageParams, PhotometricInterpretation};
use pacs_ul::pdu::AbortRQSource;
use pacs_ul::{Association, ClientAssociationOptions, FullAeAddr};
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::info;

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const STUDY_ROOT_FIND_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.2.2.1";
const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("could not read pixel data from {}", path.display()))]
    ReadPixelData { path: PathBuf, source: std::io::Error, backtrace: Backtrace },
    #[snafu(display("invalid UID {uid}"))]
    InvalidUid { uid: String, source: pacs_core::uid::UidError, backtrace: Backtrace },
    #[snafu(display("could not compress pixel data"))]
    Compress { source: pacs_pixeldata::CodecError, backtrace: Backtrace },
    #[snafu(display("could not establish association with {addr}"))]
    Establish { addr: String, source: pacs_ul::association::client::Error, backtrace: Backtrace },
    #[snafu(display("DIMSE exchange failed"))]
    Exchange { source: pacs_ul::scu::Error, backtrace: Backtrace },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Parser, Debug)]
#[command(about = "DICOM SCU: echo, store, find", version)]
struct Args {
    /// Calling AE title.
    #[arg(long, default_value = "STORE_SCU")]
    calling_ae_title: String,

    /// Called AE title.
    #[arg(long)]
    called_ae_title: String,

    /// Address of the remote AE, e.g. 127.0.0.1:11112.
    #[arg(long)]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a C-ECHO-RQ and report the response status.
    Echo,
    /// Compress a raw pixel buffer and send it as a C-STORE-RQ data set.
    Store {
        /// SOP Class UID of the instance being stored.
        #[arg(long, default_value = "1.2.840.10008.5.1.4.1.1.2")]
        sop_class_uid: String,
        /// SOP Instance UID of the instance being stored.
        #[arg(long)]
        sop_instance_uid: String,
        /// Transfer syntax the pixel data is compressed with.
        #[arg(long, default_value = "1.2.840.10008.1.2.5")]
        transfer_syntax_uid: String,
        /// Path to raw, uncompressed pixel data.
        #[arg(long)]
        pixel_data: PathBuf,
        #[arg(long)]
        width: u16,
        #[arg(long)]
        height: u16,
        #[arg(long, default_value_t = 16)]
        bits_allocated: u16,
        #[arg(long, default_value_t = 1)]
        samples_per_pixel: u16,
    },
    /// Send a C-FIND-RQ at the Study level and print every match.
    Find {
        /// PatientID to match on. Sent as a raw placeholder query
        /// payload, since building an Identifier data set requires the
        /// out-of-scope VR codec; a byte count and the string itself
        /// are printed so the exchange is still observable end to end.
        #[arg(long)]
        patient_id: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(source) = run(&args) {
        eprintln!("error: {source}");
        std::process::exit(1);
    }
}

fn parse_uid(uid: &str) -> Result<Uid> {
    Uid::new(uid).context(InvalidUidSnafu { uid })
}

fn run(args: &Args) -> Result<()> {
    let called = FullAeAddr::new(args.called_ae_title.clone(), args.addr.clone());

    match &args.command {
        Command::Echo => {
            let abstract_syntax = parse_uid(VERIFICATION_SOP_CLASS)?;
            let options = ClientAssociationOptions::new(args.calling_ae_title.clone(), called).with_abstract_syntax(
                abstract_syntax.clone(),
                [parse_uid(IMPLICIT_VR_LITTLE_ENDIAN)?],
            );
            let mut association = options.establish().context(EstablishSnafu { addr: args.addr.clone() })?;
            let status = pacs_ul::scu::echo(&mut association, 1, &abstract_syntax).context(ExchangeSnafu)?;
            println!("C-ECHO-RSP status: {status:?}");
            release(association);
        }
        Command::Store {
            sop_class_uid,
            sop_instance_uid,
            transfer_syntax_uid,
            pixel_data,
            width,
            height,
            bits_allocated,
            samples_per_pixel,
        } => {
            let raw = fs::read(pixel_data).context(ReadPixelDataSnafu { path: pixel_data.clone() })?;
            let params = ImageParams {
                width: *width,
                height: *height,
                bits_allocated: *bits_allocated,
                bits_stored: *bits_allocated,
                high_bit: bits_allocated.saturating_sub(1),
                samples_per_pixel: *samples_per_pixel,
                planar_configuration: 0,
                pixel_representation: 0,
                photometric: if *samples_per_pixel == 1 {
                    PhotometricInterpretation::Monochrome2
                } else {
                    PhotometricInterpretation::Rgb
                },
                number_of_frames: 1,
            };
            let compressed = pacs_pixeldata::encode(transfer_syntax_uid, &raw, &params, &CompressionOptions::default())
                .context(CompressSnafu)?;
            info!(raw_bytes = raw.len(), compressed_bytes = compressed.len(), "compressed pixel data");

            let abstract_syntax = parse_uid(sop_class_uid)?;
            let sop_instance = parse_uid(sop_instance_uid)?;
            let transfer_syntax = parse_uid(transfer_syntax_uid)?;
            let options = ClientAssociationOptions::new(args.calling_ae_title.clone(), called)
                .with_abstract_syntax(abstract_syntax.clone(), [transfer_syntax]);
            let mut association = options.establish().context(EstablishSnafu { addr: args.addr.clone() })?;
            let status = pacs_ul::scu::store(&mut association, 1, &abstract_syntax, &sop_instance, &compressed)
                .context(ExchangeSnafu)?;
            println!("C-STORE-RSP status: {status:?}");
            release(association);
        }
        Command::Find { patient_id } => {
            let abstract_syntax = parse_uid(STUDY_ROOT_FIND_SOP_CLASS)?;
            let options = ClientAssociationOptions::new(args.calling_ae_title.clone(), called).with_abstract_syntax(
                abstract_syntax.clone(),
                [parse_uid(IMPLICIT_VR_LITTLE_ENDIAN)?],
            );
            let mut association = options.establish().context(EstablishSnafu { addr: args.addr.clone() })?;
            let query = patient_id.as_bytes().to_vec();
            let (status, matches) =
                pacs_ul::scu::find(&mut association, 1, &abstract_syntax, &query).context(ExchangeSnafu)?;
            println!("C-FIND-RSP final status: {status:?}, {} match(es)", matches.len());
            for (i, data_set) in matches.iter().enumerate() {
                println!("  match {i}: {} bytes", data_set.len());
            }
            release(association);
        }
    }

    Ok(())
}

fn release<R: std::io::Read, W: std::io::Write>(mut association: Association<R, W>) {
    if let Err(source) = association.release() {
        tracing::warn!(%source, "release failed, aborting instead");
        let _ = association.abort(AbortRQSource::ServiceUser);
    }
}
