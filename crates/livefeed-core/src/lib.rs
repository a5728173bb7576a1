//! # livefeed-core
//!
//! Transport-independent building blocks of the Livefeed update channel.
//!
//! - **Registry** - per-category callback sets, safe to mutate mid-dispatch
//! - **Dispatcher** - routes decoded envelopes to callbacks, isolating panics
//! - **Reconnect** - bounded retry policy with fixed or exponential delay
//! - **State** - connection states and lifecycle events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Codec     │────▶│ Dispatcher  │────▶│  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲
//!        │ frames
//! ┌─────────────┐     ┌─────────────┐
//! │ Connection  │◀────│  Reconnect  │
//! └─────────────┘     └─────────────┘
//! ```

pub mod dispatcher;
pub mod reconnect;
pub mod registry;
pub mod state;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use reconnect::{Backoff, ReconnectDecision, ReconnectPolicy, ReconnectState};
pub use registry::{Registry, RegistryError, RegistryStats, Subscription, SubscriptionId};
pub use state::{ConnectionState, LifecycleEvent};
