//! Error types for the forwarding pipeline.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::error::ProtoError;
use thiserror::Error;

/// Errors raised while resolving a query.
///
/// None of these ever reach a client verbatim: the pipeline logs them and
/// answers with the standard failure response when nothing else worked.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("I/O error talking to {server}: {source}")]
    Io {
        server: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {timeout:?} talking to {server}")]
    Timeout { server: SocketAddr, timeout: Duration },

    #[error("failed to encode DNS message: {0}")]
    Encode(#[source] ProtoError),

    #[error("failed to decode DNS message from {server}: {source}")]
    Decode {
        server: SocketAddr,
        #[source]
        source: ProtoError,
    },

    #[error("response from {server} does not match the query id")]
    IdMismatch { server: SocketAddr },

    #[error("no nameserver could resolve {name}")]
    Exhausted { name: String },

    /// Failure inside a cache, hosts or hijacker backing.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ForwardError {
    pub fn io(server: SocketAddr, source: io::Error) -> Self {
        Self::Io { server, source }
    }

    pub fn timeout(server: SocketAddr, timeout: Duration) -> Self {
        Self::Timeout { server, timeout }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether this error came from talking to a nameserver.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Timeout { .. } | Self::Decode { .. } | Self::IdMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ForwardError>;
