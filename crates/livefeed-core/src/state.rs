//! Connection states and lifecycle events.

use std::fmt;
use std::time::Duration;

/// Connection state of the update channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and nothing scheduled.
    #[default]
    Disconnected,
    /// An open is in flight or scheduled. `attempt` is 0 for the first open
    /// after `connect`, otherwise the reconnect attempt number.
    Connecting {
        /// Reconnect attempt number.
        attempt: u32,
    },
    /// Connected; frames are being dispatched.
    Open,
    /// A caller-requested close is in progress.
    Closing,
    /// Reconnect budget exhausted. Left only by an explicit `connect`.
    GivenUp,
}

impl ConnectionState {
    /// Whether frames can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether a `connect` call would start a new open.
    ///
    /// `connect` is a no-op while connecting or open.
    #[must_use]
    pub fn accepts_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::GivenUp)
    }

    /// Whether an open is pending or in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }

    /// Short name used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::GivenUp => "given_up",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting { attempt } if *attempt > 0 => {
                write!(f, "connecting (attempt {attempt})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Lifecycle notification published by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A connection opened. The attempt counter was reset.
    Connected,
    /// An open connection closed without being asked to.
    ConnectionLost {
        /// Close reason, if the transport reported one.
        reason: Option<String>,
    },
    /// A reconnect is scheduled.
    Reconnecting {
        /// Attempt number, 1-based.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The reconnect budget is spent. Emitted once per exhaustion.
    GivenUp {
        /// Attempts made.
        attempts: u32,
    },
    /// The caller disconnected.
    Disconnected,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Connected => f.write_str("connected"),
            LifecycleEvent::ConnectionLost { reason: Some(r) } => {
                write!(f, "connection lost: {r}")
            }
            LifecycleEvent::ConnectionLost { reason: None } => f.write_str("connection lost"),
            LifecycleEvent::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {attempt}) in {delay:?}")
            }
            LifecycleEvent::GivenUp { attempts } => {
                write!(f, "connection failed after {attempts} attempts")
            }
            LifecycleEvent::Disconnected => f.write_str("disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Open.accepts_connect());
        assert!(ConnectionState::GivenUp.accepts_connect());
        assert!(ConnectionState::Disconnected.accepts_connect());
        assert!(!ConnectionState::Connecting { attempt: 1 }.accepts_connect());
        assert!(ConnectionState::Connecting { attempt: 2 }.is_connecting());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connecting { attempt: 0 }.to_string(), "connecting");
        assert_eq!(
            ConnectionState::Connecting { attempt: 3 }.to_string(),
            "connecting (attempt 3)"
        );
        assert_eq!(
            LifecycleEvent::GivenUp { attempts: 5 }.to_string(),
            "connection failed after 5 attempts"
        );
    }
}
