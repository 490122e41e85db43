use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::client::IntoClientRequest,
    tungstenite::protocol::frame::coding::CloseCode, tungstenite::protocol::CloseFrame,
    tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace, warn};

use super::{Connector, Transport, TransportError, TransportEvent, NORMAL_CLOSURE};
use crate::config::ClientConfig;

/// Supplies a bearer token to attach to each connection attempt.
///
/// Returning `None` connects without credentials.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Connects over WebSocket via `tokio-tungstenite`.
#[derive(Default)]
pub struct WsConnector {
    token_provider: Option<TokenProvider>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach credentials from `provider` as an `Authorization: Bearer`
    /// header on every connection attempt.
    pub fn with_token_provider(provider: TokenProvider) -> Self {
        Self {
            token_provider: Some(provider),
        }
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&mut self, config: &ClientConfig) -> Result<WsTransport, TransportError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid request: {}", e)))?;

        if !config.subprotocols.is_empty() {
            let value = HeaderValue::from_str(&config.subprotocols.join(", "))
                .map_err(|e| TransportError::Connect(format!("invalid subprotocol: {}", e)))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        if let Some(provider) = &self.token_provider {
            if let Some(token) = provider() {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| TransportError::Connect(format!("invalid token: {}", e)))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }

        debug!("Opening WebSocket connection to {}", config.url);
        let (stream, response) = connect_async(request).await?;
        trace!("WebSocket handshake completed (status: {})", response.status());

        Ok(WsTransport { stream })
    }
}

/// A live WebSocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(TransportError::from)
    }

    async fn next(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(TransportEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(TransportEvent::Message(text)),
                    Err(_) => {
                        debug!("Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received ping, sending pong");
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    trace!("Received pong");
                }
                Some(Ok(Message::Close(frame))) => {
                    return Some(TransportEvent::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    })
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Some(TransportEvent::Error(e.into())),
                None => return None,
            }
        }
    }

    async fn close(&mut self, code: Option<u16>) {
        let frame = CloseFrame {
            code: CloseCode::from(code.unwrap_or(NORMAL_CLOSURE)),
            reason: "".into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}
