//! Transport abstraction traits for Livefeed.
//!
//! The update channel opens connections through a [`Connector`] and reads
//! frames from the resulting [`Connection`], so the state machine does not
//! depend on a particular socket implementation.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// One inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl RawFrame {
    /// Frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            RawFrame::Text(text) => text.len(),
            RawFrame::Binary(data) => data.len(),
        }
    }

    /// Whether the frame carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be reached or refused the handshake.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Opening the connection took too long.
    #[error("Connection timed out")]
    Timeout,

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Endpoint settings do not form a valid URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens client connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    ///
    /// The URL may carry a credential in its query string and must not be
    /// logged.
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the connector name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An open client connection.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next data frame.
    ///
    /// Returns `None` once the peer has closed the connection. Control
    /// frames are handled internally.
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError>;

    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Close reason sent by the peer, if any.
    fn close_reason(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
