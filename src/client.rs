use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::dispatch::{ClientEvent, EventDispatcher, EventKind, SubscriptionToken};
use crate::driver::{Command, Driver};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::transport::ws::WsConnector;
use crate::transport::Connector;

/// Connection lifecycle states.
///
/// Exactly one state is active at any time; transitions happen only on
/// the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not attempting to connect
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Connected and ready to exchange envelopes
    Connected,
    /// A manual disconnect is in progress
    Disconnecting,
    /// Connection lost; a reconnect attempt is scheduled
    Reconnecting,
    /// Reconnect attempts exhausted; terminal until `connect()` is called
    Failed,
}

/// A point-in-time view of the client's working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub queued_messages: usize,
    pub pending_requests: usize,
}

/// Handle to a duplex messaging client.
///
/// Construction spawns a driver task that owns the transport and the
/// connection state machine; the handle is a thin, cheaply cloneable
/// front over a command channel. All clones share one connection.
/// Dropping the last handle shuts the driver down as if `disconnect()`
/// had been called.
///
/// Must be constructed from within a Tokio runtime.
#[derive(Clone)]
pub struct Client {
    command_tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<ConnectionState>>,
    dispatcher: Arc<EventDispatcher>,
    metrics: Arc<Metrics>,
}

impl Client {
    /// Create a client that connects over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WsConnector::new())
    }

    /// Create a client over a custom transport, e.g. a mock for tests.
    pub fn with_connector<C: Connector>(config: ClientConfig, connector: C) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let dispatcher = Arc::new(EventDispatcher::new());
        let metrics = Arc::new(Metrics::new());

        let driver = Driver::new(
            config,
            connector,
            command_rx,
            state.clone(),
            dispatcher.clone(),
            metrics.clone(),
        );
        tokio::spawn(driver.run());

        Self {
            command_tx,
            state,
            dispatcher,
            metrics,
        }
    }

    /// Open the connection.
    ///
    /// Resolves on the first successful open and rejects on the first
    /// failed attempt; later automatic retries do not reject this future.
    /// A no-op when already connecting or connected. From `Failed` this
    /// restarts the reconnect budget.
    pub async fn connect(&self) -> Result<(), Error> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect { ack })
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Close the connection. Synchronous and idempotent.
    ///
    /// This is the single cancellation point: every timer is cancelled,
    /// pending requests are rejected with `Error::ConnectionClosed`, and
    /// queued messages stay put until a later `connect()`.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect);
    }

    /// Send a fire-and-forget envelope.
    ///
    /// Resolves once the envelope was written, or queued when the
    /// connection is not usable (including a failed immediate write).
    pub async fn send(&self, envelope: Envelope) -> Result<(), Error> {
        let (ack, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send { envelope, ack })
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Send a request envelope and wait for the correlated response.
    ///
    /// A correlation id is generated when the envelope has none. The
    /// deadline is `request_timeout` from submission, whether the write
    /// was immediate or queued.
    pub async fn request(&self, envelope: Envelope) -> Result<Envelope, Error> {
        let envelope = envelope.ensure_id();
        let (response, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Request { envelope, response })
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Subscribe a handler to one event kind.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.dispatcher.subscribe(kind, handler)
    }

    /// Detach a previously registered handler.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.dispatcher.unsubscribe(token)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Snapshot of state, reconnect attempts, queue depth and pending
    /// requests.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            state: self.state(),
            reconnect_attempts: self.metrics.reconnect_attempts(),
            queued_messages: self.metrics.queued_messages(),
            pending_requests: self.metrics.pending_requests(),
        }
    }

    /// Get the metrics for this client
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}
