//! # ws-duplex-client
//!
//! A robust duplex WebSocket messaging client with auto-reconnection,
//! outbound queueing, and request/response correlation.
//!
//! ## Features
//!
//! - **Auto-reconnection** with exponential backoff and a bounded attempt
//!   budget
//! - **Outbound durability** - messages sent while disconnected are queued
//!   and flushed in order after reconnect
//! - **Request/response correlation** - promise-like requests over a
//!   fire-and-forget transport, with per-request timeouts
//! - **Heartbeat** keep-alive envelopes while connected
//! - **Pluggable transport** - a deterministic mock transport substitutes
//!   for the real WebSocket in tests
//! - **Events and metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use ws_duplex_client::{Client, ClientConfig, Envelope, EventKind};
//!
//! let config = ClientConfig::builder("wss://realtime.example.com/ws")
//!     .max_reconnect_attempts(5)
//!     .build()?;
//!
//! let client = Client::new(config);
//! client.subscribe(EventKind::Message, |event| {
//!     // Process inbound envelopes
//! });
//!
//! client.connect().await?;
//! let reply = client
//!     .request(Envelope::request("session.start", None))
//!     .await?;
//! ```

mod backoff;
mod client;
mod config;
mod correlation;
mod dispatch;
mod driver;
mod envelope;
mod error;
mod heartbeat;
mod metrics;
mod queue;
mod timer;
pub mod transport;

pub use client::{Client, ClientStats, ConnectionState};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use dispatch::{ClientEvent, EventKind, SubscriptionToken};
pub use envelope::{Envelope, HEARTBEAT_TYPE};
pub use error::{Error, ErrorKind};
pub use metrics::{Metrics, MetricsSnapshot};
pub use transport::{Connector, Transport, TransportError, TransportEvent, NORMAL_CLOSURE};

/// Result type for ws-duplex-client operations
pub type Result<T> = std::result::Result<T, Error>;
