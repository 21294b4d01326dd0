//! Identity-routed multi-part transport over TCP.
//!
//! # Data Flow
//! ```text
//! DealerSocket ──(multipart frames)──▶ RouterSocket ──▶ (identity, parts)
//!              ◀─(reply by identity)──             ◀── send(identity, parts)
//!
//! PubSocket ──(fan-out)──▶ SubSocket   (heartbeats)
//! ```
//!
//! # Responsibilities
//! - Frame multipart messages onto TCP streams
//! - Mint an opaque identity per accepted peer and route replies by it
//! - Optional public-key allow-listing on connect
//!
//! # Design Decisions
//! - Each socket half is owned by exactly one task; cross-task handoff uses
//!   bounded channels
//! - Peers that stall or disconnect are dropped, never retried

pub mod auth;
pub mod codec;
pub mod dealer;
pub mod publisher;
pub mod router;

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::TransportError;

pub use auth::Authenticator;
pub use codec::{Multipart, MultipartCodec};
pub use dealer::DealerSocket;
pub use publisher::{PubSocket, SubSocket};
pub use router::RouterSocket;

/// First frame of the authentication handshake.
pub(crate) const AUTH_COMMAND: &[u8] = b"AUTH";
/// Positive handshake acknowledgement.
pub(crate) const AUTH_OK: &[u8] = b"AUTH-OK";

/// A `tcp://host:port` transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// `host:port` form accepted by the socket APIs.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // ZeroMQ-style wildcard binds.
        let normalized = value.replace("://*:", "://0.0.0.0:");

        let url =
            Url::parse(&normalized).map_err(|_| TransportError::InvalidEndpoint(value.into()))?;

        if url.scheme() != "tcp" {
            return Err(TransportError::InvalidEndpoint(value.into()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint(value.into()))?
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| TransportError::InvalidEndpoint(value.into()))?;

        Ok(Self { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_endpoint() {
        let endpoint: Endpoint = "tcp://127.0.0.1:9091".parse().unwrap();
        assert_eq!(endpoint.authority(), "127.0.0.1:9091");
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:9091");
    }

    #[test]
    fn wildcard_host_binds_all_interfaces() {
        let endpoint: Endpoint = "tcp://*:9091".parse().unwrap();
        assert_eq!(endpoint.authority(), "0.0.0.0:9091");
    }

    #[test]
    fn rejects_other_schemes_and_missing_ports() {
        assert!("ipc:///tmp/query".parse::<Endpoint>().is_err());
        assert!("tcp://127.0.0.1".parse::<Endpoint>().is_err());
        assert!("not an endpoint".parse::<Endpoint>().is_err());
    }
}
