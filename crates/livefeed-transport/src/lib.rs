//! # livefeed-transport
//!
//! Client transport layer for the Livefeed update channel.
//!
//! - **WebSocket** - tokio-tungstenite, `ws` and `wss`
//! - **Memory** - in-process pairs with scriptable open failures, for tests
//!
//! ## Transport Abstraction
//!
//! All connectors implement the `Connector` and `Connection` traits, so the
//! channel's state machine is transport-agnostic.
//!
//! ```rust,ignore
//! use livefeed_transport::{Connection, Connector, WebSocketConnector};
//!
//! async fn tail(url: &str) -> Result<(), livefeed_transport::TransportError> {
//!     let mut conn = WebSocketConnector::new().open(url).await?;
//!     while let Some(frame) = conn.recv().await? {
//!         // Decode frame
//!     }
//!     Ok(())
//! }
//! ```

pub mod endpoint;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::Endpoint;
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer, OpenBehavior};
pub use traits::{Connection, Connector, RawFrame, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketConnectorConfig};
