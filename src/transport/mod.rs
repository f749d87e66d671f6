//! Transport layer for the forwarder.
//!
//! Provides the UDP and TCP listeners that receive DNS queries from clients
//! and the [`ResponseWriter`] handle the resolver answers through.

pub mod tcp;
pub mod udp;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tracing::debug;

use crate::resolver::Resolution;

/// Maximum size of a DNS message on either transport.
pub const MAX_DNS_PACKET_SIZE: usize = 65535;

/// Smallest possible DNS message: a bare header.
pub const MIN_DNS_PACKET_SIZE: usize = 12;

/// Transport protocol of a query, also used for the upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read and write deadlines applied to client connections and upstream
/// exchanges alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
}

impl Timeouts {
    pub fn from_secs(read: u64, write: u64) -> Self {
        Self {
            read: Duration::from_secs(read),
            write: Duration::from_secs(write),
        }
    }
}

/// Handle used to send a reply to the client that asked.
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write_message(&mut self, message: &Message) -> io::Result<()>;

    fn protocol(&self) -> Protocol;

    fn peer_addr(&self) -> SocketAddr;
}

/// Encode a message, reporting protocol errors as `InvalidData`.
pub(crate) fn encode(message: &Message) -> io::Result<Vec<u8>> {
    message
        .to_vec()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Log the outcome of one client query.
pub(crate) fn log_resolution(
    protocol: Protocol,
    peer: SocketAddr,
    query: &Message,
    resolution: Resolution,
    started: Instant,
) {
    let name = query
        .queries()
        .first()
        .map(|q| q.name().to_string())
        .unwrap_or_else(|| "<none>".to_string());

    debug!(
        protocol = %protocol,
        peer = %peer,
        name = %name,
        outcome = resolution.as_str(),
        total_ms = started.elapsed().as_secs_f64() * 1000.0,
        "query answered"
    );
}
