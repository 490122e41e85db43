use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::backoff::ReconnectScheduler;
use crate::client::ConnectionState;
use crate::config::ClientConfig;
use crate::correlation::CorrelationTable;
use crate::dispatch::{ClientEvent, EventDispatcher};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::heartbeat::HeartbeatMonitor;
use crate::metrics::Metrics;
use crate::queue::MessageQueue;
use crate::timer::{TimerKind, TimerSet};
use crate::transport::{Connector, Transport, TransportError, TransportEvent, NORMAL_CLOSURE};

/// Commands sent from client handles to the driver task.
pub(crate) enum Command {
    Connect {
        ack: oneshot::Sender<Result<(), Error>>,
    },
    Disconnect,
    Send {
        envelope: Envelope,
        ack: oneshot::Sender<Result<(), Error>>,
    },
    Request {
        envelope: Envelope,
        response: oneshot::Sender<Result<Envelope, Error>>,
    },
}

enum Wake {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Timer,
}

/// Owns the transport and the connection state machine.
///
/// Runs as a single task: transport events, handle commands, and timer
/// firings are serialized through one `select!` loop, so the queue, the
/// correlation table, and the state cell are only ever mutated here.
pub(crate) struct Driver<C: Connector> {
    config: ClientConfig,
    connector: C,
    transport: Option<C::Transport>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<RwLock<ConnectionState>>,
    dispatcher: Arc<EventDispatcher>,
    metrics: Arc<Metrics>,
    queue: MessageQueue,
    correlation: CorrelationTable,
    timers: TimerSet,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
    /// Resolved on the first open or the first failed attempt after a
    /// `connect()` call; later automatic retries never touch it.
    connect_ack: Option<oneshot::Sender<Result<(), Error>>>,
}

impl<C: Connector> Driver<C> {
    pub(crate) fn new(
        config: ClientConfig,
        connector: C,
        command_rx: mpsc::UnboundedReceiver<Command>,
        state: Arc<RwLock<ConnectionState>>,
        dispatcher: Arc<EventDispatcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let queue = MessageQueue::new(config.max_queue_size, config.max_queued_message_age);
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval);
        let reconnect = ReconnectScheduler::new(&config);
        Self {
            config,
            connector,
            transport: None,
            command_rx,
            state,
            dispatcher,
            metrics,
            queue,
            correlation: CorrelationTable::new(),
            timers: TimerSet::new(),
            heartbeat,
            reconnect,
            connect_ack: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Client driver started");
        loop {
            let wake = {
                let deadline = self.timers.next_deadline();
                let command_rx = &mut self.command_rx;
                let transport = &mut self.transport;
                tokio::select! {
                    cmd = command_rx.recv() => Wake::Command(cmd),
                    event = next_transport_event(transport) => Wake::Transport(event),
                    _ = wait_until(deadline) => Wake::Timer,
                }
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => {
                    info!("All client handles dropped, shutting down");
                    self.manual_disconnect().await;
                    break;
                }
                Wake::Transport(Some(event)) => self.handle_transport_event(event).await,
                Wake::Transport(None) => self.on_closed(None).await,
                Wake::Timer => self.handle_due_timers().await,
            }
        }
        debug!("Client driver stopped");
    }

    // ========== commands ==========

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { ack } => self.handle_connect(ack).await,
            Command::Disconnect => self.manual_disconnect().await,
            Command::Send { envelope, ack } => {
                let result = self.send_or_enqueue(envelope).await;
                let _ = ack.send(result);
            }
            Command::Request { envelope, response } => {
                self.handle_request(envelope, response).await;
            }
        }
    }

    async fn handle_connect(&mut self, ack: oneshot::Sender<Result<(), Error>>) {
        match self.current_state() {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Disconnecting => {
                // Already active; connect() is a no-op
                let _ = ack.send(Ok(()));
            }
            ConnectionState::Reconnecting => {
                debug!("connect() while reconnecting, attempting immediately");
                self.timers.cancel(TimerKind::Reconnect);
                self.connect_ack = Some(ack);
                self.try_connect().await;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.reconnect.reset();
                self.metrics.set_reconnect_attempts(0);
                self.connect_ack = Some(ack);
                self.try_connect().await;
            }
        }
    }

    async fn manual_disconnect(&mut self) {
        if self.current_state() == ConnectionState::Disconnected {
            debug!("disconnect() while already disconnected");
            return;
        }
        info!("Disconnecting");
        self.set_state(ConnectionState::Disconnecting);
        self.timers.clear();
        let had_transport = self.transport.is_some();
        if let Some(mut transport) = self.transport.take() {
            transport.close(Some(NORMAL_CLOSURE)).await;
        }
        self.reject_pending(|| Error::ConnectionClosed);
        self.reconnect.reset();
        self.metrics.set_reconnect_attempts(0);
        self.set_state(ConnectionState::Disconnected);
        if had_transport {
            self.dispatcher.emit(&ClientEvent::Close {
                code: Some(NORMAL_CLOSURE),
            });
        }
    }

    async fn send_or_enqueue(&mut self, envelope: Envelope) -> Result<(), Error> {
        if self.current_state() == ConnectionState::Connected {
            if let Some(transport) = self.transport.as_mut() {
                let text = envelope.encode()?;
                match transport.send(text).await {
                    Ok(()) => {
                        self.metrics.record_message_sent();
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(
                            "Write failed, queueing message (type: {}): {}",
                            envelope.kind, e
                        );
                    }
                }
            }
        }
        self.enqueue(envelope);
        Ok(())
    }

    async fn handle_request(
        &mut self,
        envelope: Envelope,
        response: oneshot::Sender<Result<Envelope, Error>>,
    ) {
        let id = match envelope.id.clone() {
            Some(id) => id,
            None => {
                let _ = response.send(Err(Error::Protocol(
                    "request envelope missing id".to_string(),
                )));
                return;
            }
        };

        let deadline = Instant::now() + self.config.request_timeout;
        if let Some(rejected) =
            self.correlation
                .register(id.clone(), deadline, self.config.request_timeout, response)
        {
            warn!("Duplicate request id {}", id);
            let _ = rejected.send(Err(Error::DuplicateRequestId(id)));
            return;
        }
        self.metrics.set_pending_requests(self.correlation.len());
        self.rearm_sweep();

        if let Err(e) = self.send_or_enqueue(envelope).await {
            // The envelope never left the client; fail the request now
            self.correlation.reject(&id, e);
            self.metrics.set_pending_requests(self.correlation.len());
            self.rearm_sweep();
        }
    }

    // ========== transport events ==========

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => self.on_inbound(text),
            TransportEvent::Error(e) => {
                warn!("Transport error: {}", e);
                self.metrics.record_error();
                // The subsequent close event drives any state change
                self.dispatcher
                    .emit(&ClientEvent::Error(Error::Transport(e)));
            }
            TransportEvent::Closed { code } => self.on_closed(code).await,
        }
    }

    fn on_inbound(&mut self, text: String) {
        match Envelope::decode(&text) {
            Ok(envelope) => {
                self.metrics.record_message_received();
                match self.correlation.try_resolve(envelope) {
                    None => {
                        self.metrics.set_pending_requests(self.correlation.len());
                        self.rearm_sweep();
                    }
                    Some(envelope) => {
                        trace!("Inbound message (type: {})", envelope.kind);
                        self.dispatcher.emit(&ClientEvent::Message(envelope));
                    }
                }
            }
            Err(e) => {
                self.metrics.record_protocol_error();
                warn!("Dropping malformed inbound frame: {}", e);
            }
        }
    }

    async fn on_closed(&mut self, code: Option<u16>) {
        self.transport = None;
        self.timers.cancel(TimerKind::Heartbeat);
        self.dispatcher.emit(&ClientEvent::Close { code });

        if code == Some(NORMAL_CLOSURE) {
            info!("Connection closed cleanly");
            self.reject_pending(|| Error::ConnectionClosed);
            self.reconnect.reset();
            self.metrics.set_reconnect_attempts(0);
            self.set_state(ConnectionState::Disconnected);
        } else {
            warn!("Connection closed unexpectedly (code: {:?})", code);
            let reason = match code {
                Some(code) => format!("closed with code {}", code),
                None => "stream ended".to_string(),
            };
            self.schedule_reconnect(reason);
        }
    }

    // ========== connection lifecycle ==========

    async fn try_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let attempt = timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.config),
        )
        .await;
        match attempt {
            Ok(Ok(transport)) => {
                self.transport = Some(transport);
                self.on_connected().await;
            }
            Ok(Err(e)) => self.on_connect_failed(e),
            Err(_) => {
                self.on_connect_failed(TransportError::ConnectTimeout(self.config.connect_timeout))
            }
        }
    }

    async fn on_connected(&mut self) {
        let was_reconnect = self.reconnect.attempts() > 0;
        self.reconnect.reset();
        self.metrics.set_reconnect_attempts(0);
        self.metrics.record_connection();
        info!("Connected to {}", self.config.url);

        self.set_state(ConnectionState::Connected);
        if let Some(ack) = self.connect_ack.take() {
            let _ = ack.send(Ok(()));
        }
        self.dispatcher.emit(&ClientEvent::Open);
        if was_reconnect {
            self.dispatcher.emit(&ClientEvent::Reconnected);
        }

        let now = Instant::now();
        self.timers
            .arm(TimerKind::Heartbeat, self.heartbeat.next_deadline(now));
        self.drain_queue(now).await;
    }

    fn on_connect_failed(&mut self, error: TransportError) {
        self.metrics.record_error();
        warn!("Connection attempt failed: {}", error);
        let last_error = error.to_string();
        match self.connect_ack.take() {
            Some(ack) => {
                let _ = ack.send(Err(Error::Transport(error)));
            }
            None => {
                self.dispatcher
                    .emit(&ClientEvent::Error(Error::Transport(error)));
            }
        }
        self.schedule_reconnect(last_error);
    }

    fn schedule_reconnect(&mut self, last_error: String) {
        match self.reconnect.begin_attempt() {
            Some(delay) => {
                let attempt = self.reconnect.attempts();
                self.metrics.record_reconnect_scheduled();
                self.metrics.set_reconnect_attempts(attempt);
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay, attempt, self.config.max_reconnect_attempts
                );
                self.set_state(ConnectionState::Reconnecting);
                self.timers.arm(TimerKind::Reconnect, Instant::now() + delay);
                self.dispatcher
                    .emit(&ClientEvent::Reconnecting { attempt, delay });
            }
            None => {
                let attempts = self.reconnect.attempts();
                error!("Reconnect attempts exhausted after {} attempts", attempts);
                self.timers.clear();
                self.reject_pending(|| Error::ConnectionClosed);
                self.set_state(ConnectionState::Failed);
                self.dispatcher
                    .emit(&ClientEvent::Error(Error::ReconnectExhausted {
                        attempts,
                        last_error,
                    }));
            }
        }
    }

    // ========== timers ==========

    async fn handle_due_timers(&mut self) {
        let now = Instant::now();
        for kind in self.timers.take_due(now) {
            match kind {
                TimerKind::Heartbeat => self.send_heartbeat(now).await,
                TimerKind::Reconnect => self.try_connect().await,
                TimerKind::Sweep => self.sweep_requests(now),
            }
        }
    }

    async fn send_heartbeat(&mut self, now: Instant) {
        if let Some(transport) = self.transport.as_mut() {
            let frame = self.heartbeat.frame();
            match frame.encode() {
                Ok(text) => match transport.send(text).await {
                    Ok(()) => {
                        trace!("Heartbeat sent");
                        self.metrics.record_heartbeat();
                    }
                    // Not fatal by itself: the transport's close/error
                    // signalling drives reconnection
                    Err(e) => warn!("Heartbeat send failed: {}", e),
                },
                Err(e) => warn!("Heartbeat encode failed: {}", e),
            }
            self.timers
                .arm(TimerKind::Heartbeat, self.heartbeat.next_deadline(now));
        }
    }

    fn sweep_requests(&mut self, now: Instant) {
        let expired = self.correlation.expire(now);
        if expired > 0 {
            self.metrics.record_request_timeout(expired as u64);
            self.metrics.set_pending_requests(self.correlation.len());
        }
        self.rearm_sweep();
    }

    // ========== queue ==========

    fn enqueue(&mut self, envelope: Envelope) {
        if self.queue.enqueue(envelope, Instant::now()) {
            self.metrics.record_queue_eviction();
        }
        self.metrics.set_queued_messages(self.queue.len());
    }

    async fn drain_queue(&mut self, now: Instant) {
        if self.queue.is_empty() {
            return;
        }
        debug!("Draining {} queued messages", self.queue.len());
        let mut batch = self.queue.take_all().into_iter();
        while let Some(mut message) = batch.next() {
            if self.queue.should_drop(&message, now) {
                warn!(
                    "Dropping queued message (type: {}, retries: {})",
                    message.envelope.kind, message.retry_count
                );
                continue;
            }
            let text = match message.envelope.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unencodable queued message: {}", e);
                    continue;
                }
            };
            let transport = match self.transport.as_mut() {
                Some(t) => t,
                None => {
                    self.requeue_remainder(message, batch);
                    break;
                }
            };
            match transport.send(text).await {
                Ok(()) => self.metrics.record_message_sent(),
                Err(e) => {
                    warn!("Send failed while draining, requeueing: {}", e);
                    message.retry_count += 1;
                    self.requeue_remainder(message, batch);
                    break;
                }
            }
        }
        self.metrics.set_queued_messages(self.queue.len());
    }

    /// Put back a failed message and the untouched remainder, preserving
    /// submission order.
    fn requeue_remainder(
        &mut self,
        head: crate::queue::QueuedMessage,
        rest: std::vec::IntoIter<crate::queue::QueuedMessage>,
    ) {
        let mut remainder: Vec<_> = rest.collect();
        remainder.reverse();
        for message in remainder {
            self.queue.requeue_front(message);
        }
        self.queue.requeue_front(head);
    }

    // ========== shared state ==========

    fn reject_pending(&mut self, error: impl Fn() -> Error) {
        self.correlation.reject_all(error);
        self.metrics.set_pending_requests(0);
        self.timers.cancel(TimerKind::Sweep);
    }

    fn rearm_sweep(&mut self) {
        self.timers
            .set(TimerKind::Sweep, self.correlation.next_deadline());
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, to: ConnectionState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            *state = to;
            from
        };
        if from != to {
            debug!("State changed: {:?} -> {:?}", from, to);
            self.dispatcher
                .emit(&ClientEvent::StateChanged { from, to });
        }
    }
}

async fn next_transport_event<T: Transport>(transport: &mut Option<T>) -> Option<TransportEvent> {
    match transport.as_mut() {
        Some(t) => t.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
