//! The server acceptor: listens for incoming TCP connections, applies
//! admission control, and spawns one thread per association (spec
//! §4.6).
//!
//! Concurrency model: associations never share a thread, so a slow or
//! misbehaving peer cannot stall another association's I/O; the cap on
//! concurrent associations protects the process from unbounded thread
//! growth when many peers connect at once.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{error, info, warn};

use crate::association::server::ServerAssociationOptions;
use crate::dimse::handler::ServiceHandler;
use crate::pdu::{AssociationRJResult, AssociationRJServiceProviderPresentationReason, AssociationRJSource};

/// The RQ timeout from spec §4.6: a connection that doesn't send an
/// A-ASSOCIATE-RQ within this window is dropped.
pub const ASSOCIATE_RQ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to bind listener on {addr}"))]
    Bind {
        addr: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Runs a bound TCP listener, accepting associations up to
/// `max_concurrent_associations` at a time and dispatching each to
/// `handler` on its own thread.
pub struct Acceptor {
    listener: TcpListener,
    options: Arc<ServerAssociationOptions>,
    max_concurrent_associations: usize,
    in_flight: Arc<AtomicUsize>,
}

impl Acceptor {
    pub fn bind(addr: &str, options: ServerAssociationOptions, max_concurrent_associations: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).context(BindSnafu { addr: addr.to_string() })?;
        Ok(Acceptor {
            listener,
            options: Arc::new(options),
            max_concurrent_associations,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, spawning one thread per association.
    /// `handler` is shared (read-only) across every association.
    pub fn serve_forever(&self, handler: Arc<dyn ServiceHandler>) -> ! {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.admit(stream, peer, Arc::clone(&handler));
                }
                Err(source) => {
                    error!(%source, "failed to accept connection");
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: std::net::SocketAddr, handler: Arc<dyn ServiceHandler>) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if current >= self.max_concurrent_associations {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!(%peer, "rejecting association: local limit exceeded");
            reject_local_limit(stream);
            return;
        }

        let _ = stream.set_read_timeout(Some(ASSOCIATE_RQ_TIMEOUT));
        let options = Arc::clone(&self.options);
        let in_flight = Arc::clone(&self.in_flight);

        std::thread::spawn(move || {
            let _ = stream.set_read_timeout(None);
            match options.establish(stream) {
                Ok(association) => {
                    info!(%peer, "association established");
                    if let Err(source) = crate::dimse::serve(association, handler.as_ref()) {
                        warn!(%peer, %source, "DIMSE dispatch ended with an error");
                    }
                }
                Err(source) => {
                    warn!(%peer, %source, "association negotiation failed");
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

fn reject_local_limit(stream: TcpStream) {
    use std::io::{BufReader, BufWriter};

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut writer = BufWriter::new(stream);

    if crate::pdu::reader::read_pdu(&mut reader, crate::pdu::MAXIMUM_PDU_SIZE).is_err() {
        return;
    }

    let _ = crate::pdu::writer::write_pdu(
        &mut writer,
        &crate::pdu::Pdu::AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            ),
        },
    );
    let _ = std::io::Write::flush(&mut writer);
}
