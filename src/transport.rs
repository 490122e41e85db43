//! The transport seam.
//!
//! The client is written against the [`Transport`] and [`Connector`]
//! abstractions rather than a concrete socket, so a deterministic
//! [`mock::MockTransport`] can substitute for the real
//! [`ws::WsTransport`] at construction time.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::ClientConfig;

pub mod mock;
pub mod ws;

/// Close code for a clean, intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Errors raised at the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Opening the connection failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Opening the connection did not complete in time
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Writing a message failed
    #[error("send failed: {0}")]
    Send(String),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Inbound notifications from an open transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A complete text frame arrived
    Message(String),
    /// The transport reported an error; a close usually follows
    Error(TransportError),
    /// The peer closed the connection
    Closed { code: Option<u16> },
}

/// A duplex, message-oriented connection.
///
/// `next` yields inbound events until the stream ends (`None`), which the
/// client treats like a close without a code.
pub trait Transport: Send + 'static {
    /// Write one text frame.
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next inbound event.
    fn next(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Close the connection, best effort.
    fn close(&mut self, code: Option<u16>) -> impl Future<Output = ()> + Send;
}

/// Opens [`Transport`] instances for the configured target.
///
/// Called once per connection attempt, so implementations can refresh
/// credentials or rotate endpoints between attempts.
pub trait Connector: Send + 'static {
    type Transport: Transport;

    fn connect(
        &mut self,
        config: &ClientConfig,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
