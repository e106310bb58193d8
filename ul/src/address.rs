//! Addressing types for naming a DICOM application entity on the
//! network (spec §4.6/§4.7): a host/port pair, optionally paired with
//! the AE title expected at that address.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

/// A bare network address (host:port), with no AE title attached. Used
/// by the acceptor, which learns the calling AE title from the
/// A-ASSOCIATE-RQ rather than from configuration.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AeAddr {
    address: String,
}

impl AeAddr {
    pub fn new(address: impl Into<String>) -> Self {
        AeAddr {
            address: address.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }

    pub fn to_socket_addr(&self) -> std::io::Result<SocketAddr> {
        self.address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"))
    }
}

impl fmt::Display for AeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// A network address together with the AE title that should answer
/// there, as used by an SCU dialing a known peer or an SCP advertising
/// its own identity in A-ASSOCIATE-AC.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FullAeAddr {
    ae_title: String,
    address: AeAddr,
}

impl FullAeAddr {
    pub fn new(ae_title: impl Into<String>, address: impl Into<String>) -> Self {
        FullAeAddr {
            ae_title: ae_title.into(),
            address: AeAddr::new(address),
        }
    }

    pub fn ae_title(&self) -> &str {
        &self.ae_title
    }

    pub fn address(&self) -> &AeAddr {
        &self.address
    }

    pub fn to_socket_addr(&self) -> std::io::Result<SocketAddr> {
        self.address.to_socket_addr()
    }
}

impl fmt::Display for FullAeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ae_title, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_full_address() {
        let addr = FullAeAddr::new("REMOTE_SCP", "127.0.0.1:11112");
        assert_eq!(addr.to_string(), "REMOTE_SCP@127.0.0.1:11112");
        assert_eq!(addr.ae_title(), "REMOTE_SCP");
    }
}
