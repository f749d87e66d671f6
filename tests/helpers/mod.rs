#![allow(dead_code)]
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dnsforwarder::transport::{tcp::TcpTransport, udp::UdpTransport};
use dnsforwarder::{Resolver, Timeouts};
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Address every mock nameserver answers with.
pub const MOCK_ANSWER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 10);

/// Short timeouts so failover tests stay fast.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        read: Duration::from_millis(300),
        write: Duration::from_millis(300),
    }
}

/// Upstream stand-in listening on UDP and TCP of the same local port.
///
/// Answers every query with one A record and the configured response code,
/// counting the queries it saw.
pub struct MockNameserver {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockNameserver {
    pub async fn start(rcode: ResponseCode) -> std::io::Result<Self> {
        let udp = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = udp.local_addr()?;
        let tcp = TcpListener::bind(addr).await?;
        let queries = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = queries.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = udp.recv_from(&mut buf) => {
                        if let Ok((len, peer)) = result {
                            counter.fetch_add(1, Ordering::SeqCst);
                            if let Some(response) = Self::build_response(&buf[..len], rcode) {
                                let _ = udp.send_to(&response, peer).await;
                            }
                        }
                    }
                    result = tcp.accept() => {
                        if let Ok((stream, _)) = result {
                            tokio::spawn(Self::serve_tcp(stream, counter.clone(), rcode));
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            queries,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn serve_tcp(mut stream: TcpStream, counter: Arc<AtomicUsize>, rcode: ResponseCode) {
        let mut len_buf = [0u8; 2];
        while stream.read_exact(&mut len_buf).await.is_ok() {
            let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            if stream.read_exact(&mut query).await.is_err() {
                return;
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let Some(response) = Self::build_response(&query, rcode) else {
                return;
            };
            let mut framed = (response.len() as u16).to_be_bytes().to_vec();
            framed.extend_from_slice(&response);
            if stream.write_all(&framed).await.is_err() {
                return;
            }
        }
    }

    fn build_response(query: &[u8], rcode: ResponseCode) -> Option<Vec<u8>> {
        let query = Message::from_vec(query).ok()?;
        let question = query.queries().first()?.clone();

        let mut response = Message::new();
        response
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_recursion_desired(query.recursion_desired())
            .set_recursion_available(true)
            .set_response_code(rcode);
        if rcode == ResponseCode::NoError {
            response.add_answer(Record::from_rdata(
                question.name().clone(),
                300,
                RData::A(A(MOCK_ANSWER)),
            ));
        }
        response.add_query(question);

        response.to_vec().ok()
    }
}

impl Drop for MockNameserver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Forwarder listening on ephemeral UDP and TCP ports.
pub struct Forwarder {
    pub udp_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
    pub resolver: Arc<Resolver>,
}

impl Forwarder {
    pub async fn start(resolver: Resolver) -> std::io::Result<Self> {
        let resolver = Arc::new(resolver);
        let udp = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), test_timeouts()).await?;
        let tcp = TcpTransport::bind("127.0.0.1:0".parse().unwrap(), test_timeouts()).await?;
        let udp_addr = udp.local_addr()?;
        let tcp_addr = tcp.local_addr()?;

        udp.start(resolver.clone());
        tcp.start(resolver.clone());

        Ok(Self {
            udp_addr,
            tcp_addr,
            resolver,
        })
    }
}

pub fn a_query(id: u16, name: &str) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
    message
}

/// Send a query over UDP and wait for the reply.
pub async fn udp_ask(server: SocketAddr, query: &Message) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&query.to_vec().unwrap(), server).await.unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("no UDP reply")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

/// Send queries over one TCP connection and collect the replies.
pub async fn tcp_ask(server: SocketAddr, queries: &[Message]) -> Vec<Message> {
    let mut stream = TcpStream::connect(server).await.unwrap();
    let mut replies = Vec::new();

    for query in queries {
        let bytes = query.to_vec().unwrap();
        let mut framed = (bytes.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&bytes);
        stream.write_all(&framed).await.unwrap();

        let mut len_buf = [0u8; 2];
        timeout(Duration::from_secs(5), stream.read_exact(&mut len_buf))
            .await
            .expect("no TCP reply")
            .unwrap();
        let mut body = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut body).await.unwrap();
        replies.push(Message::from_vec(&body).unwrap());
    }

    replies
}

pub fn first_a(message: &Message) -> Option<Ipv4Addr> {
    message.answers().iter().find_map(|record| match record.data() {
        Some(RData::A(A(address))) => Some(*address),
        _ => None,
    })
}
