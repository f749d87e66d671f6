//! DNS query resolution pipeline.
//!
//! Every query runs through the same short-circuiting chain:
//! 1. Hijacker (caller-supplied interception)
//! 2. Hosts (static overrides, never cached)
//! 3. Cache
//! 4. Remote lookup, whose answer is then offered to the cache
//!
//! Hosts are consulted before the cache so a static override can never be
//! masked by a cached upstream answer. Transports handle the I/O; the
//! resolver decides where the answer comes from and writes it.

use std::sync::Arc;
use std::time::Instant;

use hickory_proto::op::Message;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::dns;
use crate::hijack::{HijackOutcome, Hijacker};
use crate::hosts::Hosts;
use crate::stats::Stats;
use crate::transport::{Protocol, ResponseWriter};
use crate::upstream::Upstream;

/// TTL of synthesized hosts answers when none is configured.
pub const DEFAULT_TTL: u32 = 600;

/// Where the answer to a query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The hijacker took over the query.
    Hijacked,
    /// Answered from the hosts table.
    Local,
    /// Answered from the cache.
    Cached,
    /// Answered by an upstream nameserver.
    Forwarded,
    /// No source could answer; the client got SERVFAIL.
    Failed,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Hijacked => "hijacked",
            Resolution::Local => "local",
            Resolution::Cached => "cached",
            Resolution::Forwarded => "forwarded",
            Resolution::Failed => "failed",
        }
    }
}

/// Resolver holds the optional pipeline stages and the upstream list.
///
/// Shared between all transports and all in-flight queries.
pub struct Resolver {
    hijacker: Option<Arc<dyn Hijacker>>,
    hosts: Option<Arc<dyn Hosts>>,
    cache: Option<Arc<dyn Cache>>,
    upstream: Upstream,
    ttl: u32,
    stats: Stats,
}

impl Resolver {
    pub fn builder(upstream: Upstream) -> ResolverBuilder {
        ResolverBuilder {
            hijacker: None,
            hosts: None,
            cache: None,
            upstream,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Resolve `query` and write the answer through `writer`.
    ///
    /// Never fails: every error is logged and, when nothing could answer,
    /// the client receives the standard failure response.
    pub async fn resolve(
        &self,
        protocol: Protocol,
        writer: &mut dyn ResponseWriter,
        query: &Message,
    ) -> Resolution {
        let started = Instant::now();
        let resolution = self.run_pipeline(protocol, writer, query).await;
        self.stats.record(resolution, started.elapsed());
        resolution
    }

    async fn run_pipeline(
        &self,
        protocol: Protocol,
        writer: &mut dyn ResponseWriter,
        query: &Message,
    ) -> Resolution {
        if let Some(hijacker) = &self.hijacker {
            match hijacker.hijack(writer, query).await {
                HijackOutcome::Continue => {}
                HijackOutcome::Hijacked => return Resolution::Hijacked,
                HijackOutcome::Failed { error, hijacked } => {
                    warn!(error = %error, hijacked, "hijacker failed");
                    if hijacked {
                        return Resolution::Hijacked;
                    }
                }
            }
        }

        let Some(question) = dns::question(query) else {
            debug!(id = query.id(), "query has no question");
            send(writer, &dns::failure_response(query)).await;
            return Resolution::Failed;
        };

        if let Some(hosts) = &self.hosts {
            let hostname = dns::host_name(question.name());
            match hosts.get(&hostname).await {
                Ok(Some(address)) => {
                    let reply = dns::host_response(query, question.name(), address, self.ttl);
                    send(writer, &reply).await;
                    return Resolution::Local;
                }
                Ok(None) => {}
                Err(e) => warn!(host = %hostname, error = %e, "hosts lookup failed"),
            }
        }

        if let Some(cache) = &self.cache {
            match cache.get(query).await {
                Ok(Some(cached)) => {
                    send(writer, &dns::response_from_cache(query, cached)).await;
                    return Resolution::Cached;
                }
                Ok(None) => {}
                Err(e) => warn!(name = %question.name(), error = %e, "cache lookup failed"),
            }
        }

        let answer = match self.upstream.lookup(protocol, query).await {
            Ok(answer) => answer,
            Err(e) if e.is_transport() => {
                warn!(name = %question.name(), error = %e, "remote lookup failed");
                send(writer, &dns::failure_response(query)).await;
                return Resolution::Failed;
            }
            Err(e) => {
                debug!(name = %question.name(), error = %e, "no nameserver could answer");
                send(writer, &dns::failure_response(query)).await;
                return Resolution::Failed;
            }
        };

        send(writer, &answer).await;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.add(&answer).await {
                warn!(name = %question.name(), error = %e, "failed to cache response");
            }
        }

        Resolution::Forwarded
    }
}

/// Write a reply, logging instead of propagating failures.
async fn send(writer: &mut dyn ResponseWriter, reply: &Message) {
    if let Err(e) = writer.write_message(reply).await {
        warn!(
            protocol = %writer.protocol(),
            peer = %writer.peer_addr(),
            error = %e,
            "failed to write response"
        );
    }
}

/// Assembles a [`Resolver`]; every stage except the upstream is optional.
pub struct ResolverBuilder {
    hijacker: Option<Arc<dyn Hijacker>>,
    hosts: Option<Arc<dyn Hosts>>,
    cache: Option<Arc<dyn Cache>>,
    upstream: Upstream,
    ttl: u32,
}

impl ResolverBuilder {
    pub fn hijacker(mut self, hijacker: Arc<dyn Hijacker>) -> Self {
        self.hijacker = Some(hijacker);
        self
    }

    pub fn hosts(mut self, hosts: Arc<dyn Hosts>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// TTL of synthesized hosts answers.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> Resolver {
        Resolver {
            hijacker: self.hijacker,
            hosts: self.hosts,
            cache: self.cache,
            upstream: self.upstream,
            ttl: self.ttl,
            stats: Stats::new(),
        }
    }
}
