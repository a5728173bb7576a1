//! # livefeed-protocol
//!
//! Wire protocol definitions for the Livefeed update channel.
//!
//! The backend pushes UTF-8 JSON text frames shaped as
//! `{"type": <category>, "data": <payload>, "timestamp": <number>}`.
//! This crate turns those frames into typed [`Envelope`]s and serializes
//! outbound values back to the same text format.
//!
//! ## Categories
//!
//! - `dashboard` - full [`DashboardSnapshot`] pushes
//! - `order` - [`OrderUpdate`] status changes
//! - `risk` - [`RiskStatus`] changes
//!
//! Any other `type` decodes to [`Payload::Other`] so that a newer backend
//! never breaks an older client.
//!
//! ## Example
//!
//! ```rust
//! use livefeed_protocol::{codec, Category};
//!
//! let frame = br#"{"type":"risk","data":{"consecutiveLosses":1,"maxConsecutiveLosses":5,
//!     "macroCoolingMode":"inactive","leverageStatus":"relaxed",
//!     "maxLeverage":"2.0","currentLeverage":1.0},"timestamp":1700000000}"#;
//!
//! let envelope = codec::decode(frame).unwrap();
//! assert_eq!(envelope.category(), Some(Category::Risk));
//! ```

pub mod codec;
pub mod envelope;
pub mod payloads;

pub use codec::{decode, encode, DecodeError, EncodeError, EnvelopeCodec};
pub use envelope::{Category, Envelope, Payload, Topic, UnknownCategory};
pub use payloads::{
    CoolingMode, DashboardSnapshot, Direction, HealthStatus, LeverageStatus, OrderSide,
    OrderStatus, OrderType, OrderUpdate, RiskStatus, StrategyOverview, StrategyStatus,
    SystemHealthItem,
};
