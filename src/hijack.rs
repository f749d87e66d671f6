//! Request interception hook.

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::error::{ForwardError, Result};
use crate::transport::ResponseWriter;

/// Result of offering a query to a [`Hijacker`].
#[derive(Debug)]
pub enum HijackOutcome {
    /// Not intercepted; resolution continues.
    Continue,
    /// The hijacker wrote the response itself.
    Hijacked,
    /// The hijacker hit an error. `hijacked` still decides whether
    /// resolution stops.
    Failed { error: ForwardError, hijacked: bool },
}

impl HijackOutcome {
    pub fn hijacked(&self) -> bool {
        match self {
            HijackOutcome::Continue => false,
            HijackOutcome::Hijacked => true,
            HijackOutcome::Failed { hijacked, .. } => *hijacked,
        }
    }
}

/// Hook consulted before any other resolution stage.
///
/// A hijacker that reports [`HijackOutcome::Hijacked`] must already have
/// written a response through `writer`.
#[async_trait]
pub trait Hijacker: Send + Sync {
    async fn hijack(&self, writer: &mut dyn ResponseWriter, query: &Message) -> HijackOutcome;
}

/// Adapts a closure that either produces a complete reply or declines.
///
/// ```
/// use dnsforwarder::hijack::FnHijacker;
/// use dnsforwarder::dns;
///
/// // Refuse to resolve anything under `.internal`.
/// let hijacker = FnHijacker::new(|query: &hickory_proto::op::Message| {
///     let blocked = dns::question(query)
///         .map(|q| dns::host_name(q.name()).ends_with(".internal"))
///         .unwrap_or(false);
///     Ok(blocked.then(|| dns::failure_response(query)))
/// });
/// # let _ = hijacker;
/// ```
pub struct FnHijacker<F> {
    f: F,
}

impl<F> FnHijacker<F> {
    pub fn new(f: F) -> Self
    where
        F: Fn(&Message) -> Result<Option<Message>> + Send + Sync,
    {
        Self { f }
    }
}

#[async_trait]
impl<F> Hijacker for FnHijacker<F>
where
    F: Fn(&Message) -> Result<Option<Message>> + Send + Sync,
{
    async fn hijack(&self, writer: &mut dyn ResponseWriter, query: &Message) -> HijackOutcome {
        let reply = match (self.f)(query) {
            Ok(Some(reply)) => reply,
            Ok(None) => return HijackOutcome::Continue,
            Err(error) => {
                return HijackOutcome::Failed {
                    error,
                    hijacked: false,
                };
            }
        };

        match writer.write_message(&reply).await {
            Ok(()) => HijackOutcome::Hijacked,
            Err(e) => HijackOutcome::Failed {
                error: ForwardError::backend(format!("writing hijacked response: {e}")),
                hijacked: true,
            },
        }
    }
}
