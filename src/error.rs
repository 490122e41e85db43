use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Categorizes errors for subscriber decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that can be matched on without destructuring the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level open or write failure
    Transport,
    /// Inbound data could not be decoded into an envelope
    Protocol,
    /// A pending request deadline elapsed with no matching response
    Timeout,
    /// The connection was closed while requests were outstanding
    ConnectionClosed,
    /// Automatic reconnection attempts were exhausted
    ReconnectExhausted,
    /// The outbound queue evicted its oldest entry (advisory)
    QueueOverflow,
    /// A request id collided with an already-pending request
    DuplicateRequestId,
    /// The client driver task is no longer running
    ChannelClosed,
    /// Invalid configuration
    Config,
}

/// Errors surfaced by the duplex client.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport open or write failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Inbound frame could not be decoded into an envelope
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A request deadline elapsed with no matching response
    #[error("request {id} timed out after {timeout:?}")]
    RequestTimeout { id: String, timeout: Duration },

    /// The connection was torn down while the operation was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// Reconnection attempts exhausted; the client stays in `Failed`
    /// until `connect()` is called again
    #[error("reconnect attempts exhausted after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// The oldest queued message was evicted due to capacity (advisory)
    #[error("outbound queue full ({capacity}), oldest message evicted")]
    QueueOverflow { capacity: usize },

    /// A request envelope reused an id that is still pending
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(String),

    /// The driver task has exited; the handle is inoperable
    #[error("client driver is not running")]
    ChannelClosed,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::RequestTimeout { .. } => ErrorKind::Timeout,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            Error::QueueOverflow { .. } => ErrorKind::QueueOverflow,
            Error::DuplicateRequestId(_) => ErrorKind::DuplicateRequestId,
            Error::ChannelClosed => ErrorKind::ChannelClosed,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}
