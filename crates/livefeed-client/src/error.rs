//! Errors returned to callers of the update channel.
//!
//! Transport failures and decode errors never surface here; they are handled
//! by the reconnect policy and the receive path. Only misuse does.

use livefeed_core::RegistryError;
use livefeed_protocol::EncodeError;
use livefeed_transport::TransportError;
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Subscription request names an unknown category.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Outbound value cannot be serialized.
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[from] EncodeError),

    /// `connect` was called with an empty credential.
    #[error("Credential is empty")]
    EmptyCredential,

    /// The configured endpoint does not form a valid URL.
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[source] TransportError),

    /// The channel's worker task is no longer running.
    #[error("Channel worker stopped")]
    Closed,
}
