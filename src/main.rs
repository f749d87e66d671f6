use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dnsforwarder::proxy::{self, ProxyConfig};
use dnsforwarder::{Configuration, MemoryCache, MemoryHosts, Resolver, Upstream};

#[derive(Parser)]
#[command(name = "dnsforwarder")]
#[command(version)]
#[command(about = "DNS forwarder with local hosts, caching and upstream failover", long_about = None)]
struct Args {
    /// JSON configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Local port to listen on (UDP and TCP)
    #[arg(short, long, default_value = "5353")]
    port: u16,

    /// Disable the response cache
    #[arg(long)]
    no_cache: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Configuration::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Configuration::default(),
    };

    let upstream = Upstream::new(config.name_servers.clone(), config.timeouts());
    let mut builder = Resolver::builder(upstream).ttl(config.ttl);

    if !config.hosts.is_empty() {
        let hosts = MemoryHosts::from_entries(config.hosts.clone());
        info!(entries = hosts.len(), "loaded hosts");
        builder = builder.hosts(Arc::new(hosts));
    }
    if !args.no_cache {
        builder = builder.cache(Arc::new(MemoryCache::new()));
    }

    let bind_addr = SocketAddr::new(args.bind, args.port);
    let proxy_config = ProxyConfig {
        udp_addr: bind_addr,
        tcp_addr: bind_addr,
        timeouts: config.timeouts(),
        stats_interval: Duration::from_secs(60),
    };

    proxy::run(proxy_config, Arc::new(builder.build()))
        .await
        .with_context(|| format!("serving on {bind_addr}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(args))
}
