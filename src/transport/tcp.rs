//! TCP transport for DNS queries.
//!
//! Each client connection is handled in its own task. Messages are prefixed
//! with a 2-byte big-endian length; queries on one connection are answered
//! in order until the client closes it or stays idle past the read timeout.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{MAX_DNS_PACKET_SIZE, Protocol, ResponseWriter, Timeouts, encode, log_resolution};
use crate::resolver::Resolver;

/// TCP listener.
pub struct TcpTransport {
    listener: TcpListener,
    timeouts: Timeouts,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr, timeouts: Timeouts) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener, timeouts })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run_accept_loop(self.listener, resolver, self.timeouts))
    }
}

/// Accept loop - spawns a handler task for each incoming connection.
async fn run_accept_loop(listener: TcpListener, resolver: Arc<Resolver>, timeouts: Timeouts) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::spawn(handle_connection(client, peer, resolver.clone(), timeouts));
            }
            Err(e) => {
                warn!(error = %e, "TCP accept error");
            }
        }
    }
}

async fn handle_connection(
    client: TcpStream,
    peer: SocketAddr,
    resolver: Arc<Resolver>,
    timeouts: Timeouts,
) {
    let (mut reader, writer) = client.into_split();
    let mut responder = TcpResponder {
        writer,
        peer,
        write_timeout: timeouts.write,
    };

    loop {
        let bytes = match timeout(timeouts.read, read_dns_message(&mut reader)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                debug!(peer = %peer, error = %e, "TCP read error");
                return;
            }
            Err(_) => {
                debug!(peer = %peer, "closing idle TCP connection");
                return;
            }
        };

        let query = match Message::from_vec(&bytes) {
            Ok(query) => query,
            Err(e) => {
                debug!(peer = %peer, error = %e, "closing TCP connection after undecodable query");
                return;
            }
        };

        let started = Instant::now();
        let resolution = resolver.resolve(Protocol::Tcp, &mut responder, &query).await;
        log_resolution(Protocol::Tcp, peer, &query, resolution, started);
    }
}

/// Read one length-prefixed DNS message.
///
/// Returns `Ok(None)` when the peer closed the stream before a new message
/// started.
pub(crate) async fn read_dns_message<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let msg_len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; msg_len];
    reader.read_exact(&mut buf).await?;

    Ok(Some(buf))
}

/// Write one DNS message with its 2-byte length prefix.
pub(crate) async fn write_dns_message<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if message.len() > MAX_DNS_PACKET_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message too large for TCP: {} bytes", message.len()),
        ));
    }

    let mut buf = Vec::with_capacity(2 + message.len());
    buf.extend_from_slice(&(message.len() as u16).to_be_bytes());
    buf.extend_from_slice(message);
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Sends replies on the client's connection.
pub struct TcpResponder {
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    write_timeout: Duration,
}

#[async_trait]
impl ResponseWriter for TcpResponder {
    async fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let bytes = encode(message)?;

        timeout(self.write_timeout, write_dns_message(&mut self.writer, &bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TCP write timed out"))?
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
