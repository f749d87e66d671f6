//! UDP transport for DNS queries.
//!
//! One receive loop per socket; every datagram is resolved in its own task
//! and answered from the listening socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{
    MAX_DNS_PACKET_SIZE, MIN_DNS_PACKET_SIZE, Protocol, ResponseWriter, Timeouts, encode,
    log_resolution,
};
use crate::resolver::Resolver;

/// UDP listener.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    timeouts: Timeouts,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr, timeouts: Timeouts) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket, timeouts })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, resolver, self.timeouts.write))
    }
}

async fn run(socket: Arc<UdpSocket>, resolver: Arc<Resolver>, write_timeout: Duration) {
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        if len < MIN_DNS_PACKET_SIZE {
            continue;
        }

        let query = match Message::from_vec(&buf[..len]) {
            Ok(query) => query,
            Err(e) => {
                debug!(peer = %peer, error = %e, "dropping undecodable UDP query");
                continue;
            }
        };

        let socket = socket.clone();
        let resolver = resolver.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let mut writer = UdpResponder {
                socket,
                peer,
                write_timeout,
            };
            let resolution = resolver.resolve(Protocol::Udp, &mut writer, &query).await;
            log_resolution(Protocol::Udp, peer, &query, resolution, started);
        });
    }
}

/// Sends replies back through the listening socket.
pub struct UdpResponder {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    write_timeout: Duration,
}

#[async_trait]
impl ResponseWriter for UdpResponder {
    async fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let bytes = encode(message)?;

        timeout(self.write_timeout, self.socket.send_to(&bytes, self.peer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "UDP write timed out"))??;

        Ok(())
    }

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
