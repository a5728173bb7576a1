//! In-memory connector.
//!
//! Pairs each opened [`MemoryConnection`] with a [`MemoryPeer`] that plays
//! the server side. Opens can be scripted to fail or hang, which makes the
//! connector suitable for driving reconnect logic under a paused clock.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

use crate::traits::{Connection, Connector, RawFrame, TransportError};

/// Outcome of one scripted open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Open succeeds and a peer is handed to the server side.
    Accept,
    /// Open fails immediately.
    Refuse,
    /// Open never completes.
    Hang,
}

#[derive(Debug)]
enum ToClient {
    Frame(RawFrame),
    Close(Option<String>),
}

struct Shared {
    script: VecDeque<OpenBehavior>,
    fallback: OpenBehavior,
    urls: Vec<String>,
}

/// Connector whose connections live in process memory.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of a [`MemoryConnector`]. Yields one peer per accepted open.
pub struct MemoryServer {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector that accepts every open, and its server side.
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Mutex::new(Shared {
                script: VecDeque::new(),
                fallback: OpenBehavior::Accept,
                urls: Vec::new(),
            })),
            peers: tx,
        };
        (connector, MemoryServer { peers: rx })
    }

    /// Queue behaviors for the next opens, consumed in order.
    pub fn script(&self, behaviors: impl IntoIterator<Item = OpenBehavior>) {
        self.with_shared(|shared| shared.script.extend(behaviors));
    }

    /// Behavior once the script is exhausted.
    pub fn set_fallback(&self, behavior: OpenBehavior) {
        self.with_shared(|shared| shared.fallback = behavior);
    }

    /// Number of opens attempted so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.with_shared(|shared| shared.urls.len())
    }

    /// URLs passed to each open, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.with_shared(|shared| shared.urls.clone())
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        let mut guard = self
            .shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let behavior = self.with_shared(|shared| {
            shared.urls.push(url.to_string());
            shared.script.pop_front().unwrap_or(shared.fallback)
        });
        trace!(?behavior, "Memory open");

        match behavior {
            OpenBehavior::Accept => {
                let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
                let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
                let peer = MemoryPeer {
                    url: url.to_string(),
                    to_client: to_client_tx,
                    from_client: to_server_rx,
                };
                self.peers
                    .send(peer)
                    .map_err(|_| TransportError::ConnectFailed("server side dropped".into()))?;
                Ok(Box::new(MemoryConnection {
                    inbound: to_client_rx,
                    outbound: Some(to_server_tx),
                    is_open: true,
                    close_reason: None,
                }))
            }
            OpenBehavior::Refuse => Err(TransportError::ConnectFailed("connection refused".into())),
            OpenBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout)
            }
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryServer {
    /// Wait for the next accepted open.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Take an accepted peer without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// Server end of one in-memory connection.
///
/// Dropping the peer closes the connection without a reason.
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::UnboundedSender<ToClient>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client opened.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client. Returns `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .send(ToClient::Frame(RawFrame::Text(text.into())))
            .is_ok()
    }

    /// Push a raw frame to the client.
    pub fn send_frame(&self, frame: RawFrame) -> bool {
        self.to_client.send(ToClient::Frame(frame)).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(self, reason: Option<&str>) {
        let _ = self.to_client.send(ToClient::Close(reason.map(str::to_string)));
    }

    /// Next text frame the client sent, `None` once the client closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Text frame the client already sent, if any.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Whether the client side has closed or dropped the connection.
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

/// Client end of one in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<ToClient>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    is_open: bool,
    close_reason: Option<String>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn recv(&mut self) -> Result<Option<RawFrame>, TransportError> {
        if !self.is_open {
            return Ok(None);
        }
        match self.inbound.recv().await {
            Some(ToClient::Frame(frame)) => Ok(Some(frame)),
            Some(ToClient::Close(reason)) => {
                self.close_reason = reason;
                self.is_open = false;
                Ok(None)
            }
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        match &self.outbound {
            Some(outbound) if self.is_open => outbound
                .send(text)
                .map_err(|_| TransportError::ConnectionClosed),
            _ => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.inbound.close();
        self.outbound = None;
        Ok(())
    }

    fn close_reason(&self) -> Option<String> {
        self.close_reason.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
