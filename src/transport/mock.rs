//! Deterministic in-memory transport.
//!
//! [`mock_pair`] returns a [`MockConnector`] to hand to the client and a
//! [`MockHandle`] the test keeps. Every successful connection attempt
//! produces a [`MockSession`] on the handle, through which the test reads
//! outbound frames and scripts inbound events, close codes, and failures.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, Transport, TransportError, TransportEvent, NORMAL_CLOSURE};
use crate::config::ClientConfig;
use crate::envelope::Envelope;

#[derive(Debug, Default)]
struct Shared {
    connect_attempts: u32,
    fail_next_connects: u32,
    fail_next_sends: u32,
}

/// Create a connected connector/handle pair.
pub fn mock_pair() -> (MockConnector, MockHandle) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    (
        MockConnector {
            shared: shared.clone(),
            sessions_tx,
        },
        MockHandle {
            shared,
            sessions_rx,
        },
    )
}

/// Connector half handed to the client under test.
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
    sessions_tx: mpsc::UnboundedSender<MockSession>,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self, _config: &ClientConfig) -> Result<MockTransport, TransportError> {
        {
            let mut shared = self.shared.lock();
            shared.connect_attempts += 1;
            if shared.fail_next_connects > 0 {
                shared.fail_next_connects -= 1;
                return Err(TransportError::Connect("mock connect refused".to_string()));
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let close_code = Arc::new(Mutex::new(None));

        let session = MockSession {
            outbound: outbound_rx,
            incoming: incoming_tx,
            close_code: close_code.clone(),
        };
        let _ = self.sessions_tx.send(session);

        Ok(MockTransport {
            shared: self.shared.clone(),
            outbound: outbound_tx,
            incoming: incoming_rx,
            close_code,
        })
    }
}

/// Test-side controls shared across all sessions of one connector.
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
    sessions_rx: mpsc::UnboundedReceiver<MockSession>,
}

impl MockHandle {
    /// Wait for the next successful connection.
    pub async fn session(&mut self) -> Option<MockSession> {
        self.sessions_rx.recv().await
    }

    /// Total connection attempts, including failed ones.
    pub fn connect_attempts(&self) -> u32 {
        self.shared.lock().connect_attempts
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.lock().fail_next_connects = count;
    }

    /// Fail the next `count` transport writes.
    pub fn fail_next_sends(&self, count: u32) {
        self.shared.lock().fail_next_sends = count;
    }
}

/// One live mock connection, seen from the test side.
///
/// Dropping the session ends the client's inbound stream, which the client
/// treats as a close without a code.
pub struct MockSession {
    outbound: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<TransportEvent>,
    close_code: Arc<Mutex<Option<u16>>>,
}

impl MockSession {
    /// Next frame the client wrote.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame the client wrote, decoded.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        let text = self.outbound.recv().await?;
        Envelope::decode(&text).ok()
    }

    /// Deliver a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.incoming.send(TransportEvent::Message(text.into()));
    }

    /// Deliver an envelope to the client.
    pub fn push_envelope(&self, envelope: &Envelope) {
        if let Ok(text) = envelope.encode() {
            self.push_text(text);
        }
    }

    /// Deliver a transport error to the client.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self
            .incoming
            .send(TransportEvent::Error(TransportError::Send(message.into())));
    }

    /// Close the connection from the server side with the given code.
    pub fn close(&self, code: u16) {
        let _ = self
            .incoming
            .send(TransportEvent::Closed { code: Some(code) });
    }

    /// Close code the client sent, if it closed the connection.
    pub fn client_close_code(&self) -> Option<u16> {
        *self.close_code.lock()
    }
}

/// Client-side half of a mock connection.
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
    outbound: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    close_code: Arc<Mutex<Option<u16>>>,
}

impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        {
            let mut shared = self.shared.lock();
            if shared.fail_next_sends > 0 {
                shared.fail_next_sends -= 1;
                return Err(TransportError::Send("mock send failure".to_string()));
            }
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Send("mock peer gone".to_string()))
    }

    async fn next(&mut self) -> Option<TransportEvent> {
        self.incoming.recv().await
    }

    async fn close(&mut self, code: Option<u16>) {
        *self.close_code.lock() = Some(code.unwrap_or(NORMAL_CLOSURE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::builder("ws://localhost:9999/rt")
            .build()
            .expect("valid config")
    }

    #[tokio::test]
    async fn test_scripted_roundtrip() {
        let (mut connector, mut handle) = mock_pair();

        let mut transport = connector.connect(&config()).await.unwrap();
        let mut session = handle.session().await.unwrap();
        assert_eq!(handle.connect_attempts(), 1);

        transport.send("outbound".to_string()).await.unwrap();
        assert_eq!(session.next_outbound().await.unwrap(), "outbound");

        session.push_text("inbound");
        match transport.next().await.unwrap() {
            TransportEvent::Message(text) => assert_eq!(text, "inbound"),
            other => panic!("unexpected event: {:?}", other),
        }

        session.close(1000);
        match transport.next().await.unwrap() {
            TransportEvent::Closed { code } => assert_eq!(code, Some(1000)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let (mut connector, handle) = mock_pair();

        handle.fail_next_connects(2);
        assert!(connector.connect(&config()).await.is_err());
        assert!(connector.connect(&config()).await.is_err());
        assert!(connector.connect(&config()).await.is_ok());
        assert_eq!(handle.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_send_failure_budget() {
        let (mut connector, mut handle) = mock_pair();
        let mut transport = connector.connect(&config()).await.unwrap();
        let mut session = handle.session().await.unwrap();

        handle.fail_next_sends(1);
        assert!(transport.send("lost".to_string()).await.is_err());
        assert!(transport.send("kept".to_string()).await.is_ok());
        assert_eq!(session.next_outbound().await.unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_client_close_is_recorded() {
        let (mut connector, mut handle) = mock_pair();
        let mut transport = connector.connect(&config()).await.unwrap();
        let session = handle.session().await.unwrap();

        assert_eq!(session.client_close_code(), None);
        transport.close(Some(NORMAL_CLOSURE)).await;
        assert_eq!(session.client_close_code(), Some(1000));
    }
}
