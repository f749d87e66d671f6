//! dnsforwarder - A DNS forwarding daemon.
//!
//! Queries are answered, in order, by an optional hijacker, a static hosts
//! table, a response cache, or the first upstream nameserver that gives a
//! usable answer.

pub mod cache;
pub mod config;
pub mod dns;
pub mod error;
pub mod hijack;
pub mod hosts;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod upstream;

pub use cache::{Cache, MemoryCache};
pub use config::{ConfigError, Configuration};
pub use error::{ForwardError, Result};
pub use hijack::{FnHijacker, HijackOutcome, Hijacker};
pub use hosts::{Hosts, MemoryHosts};
pub use resolver::{Resolution, Resolver, ResolverBuilder};
pub use transport::{Protocol, ResponseWriter, Timeouts};
pub use upstream::{Exchange, NetworkExchange, Upstream};
