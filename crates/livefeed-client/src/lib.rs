//! # livefeed-client
//!
//! Resilient real-time update channel.
//!
//! One [`UpdateChannel`] keeps a single connection to the update feed,
//! reconnects after unexpected drops with a bounded attempt budget, and fans
//! decoded events out to per-category subscribers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use livefeed_client::{ChannelOptions, UpdateChannel};
//! use livefeed_protocol::{Category, Payload};
//! use secrecy::SecretString;
//!
//! let channel = UpdateChannel::websocket(ChannelOptions::default());
//!
//! let sub = channel.subscribe(Category::Dashboard, |payload| {
//!     if let Payload::Dashboard(snapshot) = payload {
//!         println!("equity: {}", snapshot.total_equity);
//!     }
//! });
//!
//! channel.connect(SecretString::new(token))?;
//! // ...
//! sub.unsubscribe();
//! channel.disconnect().await;
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod metrics;

pub use channel::{ChannelOptions, UpdateChannel};
pub use config::ChannelConfig;
pub use error::ChannelError;

pub use livefeed_core::{ConnectionState, LifecycleEvent, ReconnectPolicy, Subscription};
