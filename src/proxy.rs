//! Forwarder orchestration.
//!
//! Binds both transports and runs them until one of them stops.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{Either, select};
use tracing::{error, info};

use crate::resolver::Resolver;
use crate::transport::Timeouts;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};

/// Configuration for the listeners.
pub struct ProxyConfig {
    /// Address of the UDP listener (e.g., 127.0.0.1:5353)
    pub udp_addr: SocketAddr,
    /// Address of the TCP listener
    pub tcp_addr: SocketAddr,
    pub timeouts: Timeouts,
    /// How often to log statistics
    pub stats_interval: Duration,
}

/// Run the forwarder with the given configuration.
///
/// Fails if either listener cannot be bound. Otherwise runs until a
/// listener task ends, which only happens if it panics.
pub async fn run(config: ProxyConfig, resolver: Arc<Resolver>) -> io::Result<()> {
    let udp = UdpTransport::bind(config.udp_addr, config.timeouts).await?;
    let tcp = TcpTransport::bind(config.tcp_addr, config.timeouts).await?;

    let nameservers: Vec<_> = resolver
        .upstream()
        .nameservers()
        .iter()
        .map(|a| a.to_string())
        .collect();
    info!(
        udp = %udp.local_addr()?,
        tcp = %tcp.local_addr()?,
        nameservers = %nameservers.join(", "),
        "DNS forwarder listening"
    );

    let udp_task = udp.start(resolver.clone());
    let tcp_task = tcp.start(resolver.clone());

    let stats_task = tokio::spawn(log_stats(resolver, config.stats_interval));

    let (stopped, result) = match select(udp_task, tcp_task).await {
        Either::Left((result, _)) => ("UDP", result),
        Either::Right((result, _)) => ("TCP", result),
    };
    stats_task.abort();

    if let Err(e) = &result {
        error!(listener = stopped, error = %e, "listener task failed");
    }
    Err(io::Error::other(format!("{stopped} listener stopped")))
}

async fn log_stats(resolver: Arc<Resolver>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let stats = resolver.stats().snapshot_and_reset();
        info!(
            uptime_secs = stats.uptime_secs,
            requests = stats.requests,
            hijacked = stats.hijacked,
            local = stats.local,
            cached = stats.cached,
            forwarded = stats.forwarded,
            failed = stats.failed,
            avg_response_ms = %format!("{:.2}", stats.avg_response_ms),
            "stats"
        );
    }
}
