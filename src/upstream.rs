//! Remote lookup against the configured nameservers.
//!
//! Nameservers are tried strictly in configured order. A transport error or
//! a protocol-level failure code moves on to the next one; the first usable
//! answer wins.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{ForwardError, Result};
use crate::transport::tcp::{read_dns_message, write_dns_message};
use crate::transport::{MAX_DNS_PACKET_SIZE, Protocol, Timeouts};

/// One query/response exchange with one nameserver.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(
        &self,
        protocol: Protocol,
        server: SocketAddr,
        query: &Message,
    ) -> Result<Message>;
}

/// Whether a nameserver's response may be handed to the client.
///
/// NXDOMAIN is a real answer; only codes saying the server could not or
/// would not process the query disqualify it.
pub fn is_usable(code: ResponseCode) -> bool {
    !matches!(
        code,
        ResponseCode::ServFail | ResponseCode::FormErr | ResponseCode::NotImp | ResponseCode::Refused
    )
}

/// Ordered list of upstream nameservers.
pub struct Upstream {
    nameservers: Vec<SocketAddr>,
    exchange: Arc<dyn Exchange>,
}

impl Upstream {
    /// Talk to `nameservers` over the network with the given timeouts.
    pub fn new(nameservers: Vec<SocketAddr>, timeouts: Timeouts) -> Self {
        Self::with_exchange(nameservers, Arc::new(NetworkExchange::new(timeouts)))
    }

    pub fn with_exchange(nameservers: Vec<SocketAddr>, exchange: Arc<dyn Exchange>) -> Self {
        Self {
            nameservers,
            exchange,
        }
    }

    pub fn nameservers(&self) -> &[SocketAddr] {
        &self.nameservers
    }

    /// Resolve `query` through the first nameserver that gives a usable
    /// answer.
    ///
    /// When every nameserver fails, the last transport error is returned, or
    /// [`ForwardError::Exhausted`] if they all answered with failure codes.
    pub async fn lookup(&self, protocol: Protocol, query: &Message) -> Result<Message> {
        let mut last_error = None;

        for &server in &self.nameservers {
            match self.exchange.exchange(protocol, server, query).await {
                Ok(response) if is_usable(response.response_code()) => {
                    trace!(server = %server, "nameserver answered");
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(
                        server = %server,
                        rcode = ?response.response_code(),
                        "nameserver could not answer, trying next"
                    );
                }
                Err(e) => {
                    warn!(server = %server, protocol = %protocol, error = %e, "nameserver exchange failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ForwardError::Exhausted {
            name: query
                .queries()
                .first()
                .map(|q| q.name().to_string())
                .unwrap_or_default(),
        }))
    }
}

/// Socket-backed [`Exchange`].
#[derive(Debug, Clone, Copy)]
pub struct NetworkExchange {
    read_timeout: Duration,
    write_timeout: Duration,
}

impl NetworkExchange {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            read_timeout: timeouts.read,
            write_timeout: timeouts.write,
        }
    }

    async fn exchange_udp(&self, server: SocketAddr, query: &Message) -> Result<Message> {
        let bytes = query.to_vec().map_err(ForwardError::Encode)?;

        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ForwardError::io(server, e))?;
        socket
            .connect(server)
            .await
            .map_err(|e| ForwardError::io(server, e))?;

        timeout(self.write_timeout, socket.send(&bytes))
            .await
            .map_err(|_| ForwardError::timeout(server, self.write_timeout))?
            .map_err(|e| ForwardError::io(server, e))?;

        timeout(self.read_timeout, recv_matching(&socket, server, query.id()))
            .await
            .map_err(|_| ForwardError::timeout(server, self.read_timeout))?
    }

    async fn exchange_tcp(&self, server: SocketAddr, query: &Message) -> Result<Message> {
        let bytes = query.to_vec().map_err(ForwardError::Encode)?;

        let mut stream = timeout(self.write_timeout, TcpStream::connect(server))
            .await
            .map_err(|_| ForwardError::timeout(server, self.write_timeout))?
            .map_err(|e| ForwardError::io(server, e))?;

        timeout(self.write_timeout, write_dns_message(&mut stream, &bytes))
            .await
            .map_err(|_| ForwardError::timeout(server, self.write_timeout))?
            .map_err(|e| ForwardError::io(server, e))?;

        let response = timeout(self.read_timeout, read_dns_message(&mut stream))
            .await
            .map_err(|_| ForwardError::timeout(server, self.read_timeout))?
            .map_err(|e| ForwardError::io(server, e))?
            .ok_or_else(|| {
                ForwardError::io(
                    server,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before response"),
                )
            })?;

        let response = Message::from_vec(&response)
            .map_err(|source| ForwardError::Decode { server, source })?;
        if response.id() != query.id() {
            return Err(ForwardError::IdMismatch { server });
        }

        Ok(response)
    }
}

#[async_trait]
impl Exchange for NetworkExchange {
    async fn exchange(
        &self,
        protocol: Protocol,
        server: SocketAddr,
        query: &Message,
    ) -> Result<Message> {
        match protocol {
            Protocol::Udp => self.exchange_udp(server, query).await,
            Protocol::Tcp => self.exchange_tcp(server, query).await,
        }
    }
}

/// Receive datagrams until one carries the expected transaction id.
async fn recv_matching(socket: &UdpSocket, server: SocketAddr, id: u16) -> Result<Message> {
    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let len = socket
            .recv(&mut buf)
            .await
            .map_err(|e| ForwardError::io(server, e))?;

        let response = match Message::from_vec(&buf[..len]) {
            Ok(response) => response,
            Err(e) => {
                trace!(server = %server, error = %e, "ignoring undecodable datagram");
                continue;
            }
        };
        if response.id() == id {
            return Ok(response);
        }
        trace!(server = %server, expected = id, got = response.id(), "ignoring stray response");
    }
}
