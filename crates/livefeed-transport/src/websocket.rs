//! WebSocket connector implementation.
//!
//! This module provides a WebSocket-based connector using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest, protocol::WebSocketConfig, Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::{Connection, Connector, RawFrame, TransportError};

/// Default hard limit on a single inbound message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// WebSocket connector configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConnectorConfig {
    /// Messages above this size fail the connection.
    pub max_message_size: usize,
    /// Disable Nagle's algorithm on the TCP socket.
    pub disable_nagle: bool,
}

impl Default for WebSocketConnectorConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            disable_nagle: true,
        }
    }
}

/// Opens WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConnectorConfig,
}

impl WebSocketConnector {
    /// Create a connector with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector with the given settings.
    #[must_use]
    pub fn with_config(config: WebSocketConnectorConfig) -> Self {
        Self { config }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.config.max_message_size);
        config.max_frame_size = Some(self.config.max_message_size);
        config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (stream, response) =
            connect_async_with_config(request, Some(self.ws_config()), self.config.disable_nagle)
                .await
                .map_err(|e| {
                    debug!(error = %e, "WebSocket handshake failed");
                    TransportError::ConnectFailed(e.to_string())
                })?;

        debug!(status = %response.status(), "WebSocket handshake completed");
        Ok(Box::new(WebSocketConnection::new(stream)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client WebSocket connection.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    is_open: bool,
    close_reason: Option<String>,
}

impl WebSocketConnection {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            is_open: true,
            close_reason: None,
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError> {
        if !self.is_open {
            return Ok(None);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(RawFrame::Text(text))),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(RawFrame::Binary(Bytes::from(data))))
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!(error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Received close frame");
                    self.close_reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {e}"))),
        }
    }

    fn close_reason(&self) -> Option<String> {
        self.close_reason.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
