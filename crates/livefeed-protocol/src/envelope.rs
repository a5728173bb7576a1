//! Envelope and category types.
//!
//! An envelope is one decoded inbound unit: a category-tagged payload plus the
//! sender's timestamp and the local time it was received.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payloads::{DashboardSnapshot, OrderUpdate, RiskStatus};

/// Event categories the channel knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Full dashboard snapshot.
    Dashboard,
    /// Order status change.
    Order,
    /// Risk control status change.
    Risk,
}

impl Category {
    /// Every known category, in declaration order.
    pub const ALL: [Category; 3] = [Category::Dashboard, Category::Order, Category::Risk];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Dashboard => "dashboard",
            Category::Order => "order",
            Category::Risk => "risk",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a category name is not one of [`Category::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" => Ok(Category::Dashboard),
            "order" => Ok(Category::Order),
            "risk" => Ok(Category::Risk),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Typed payload carried by an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `dashboard` push.
    Dashboard(DashboardSnapshot),
    /// `order` push.
    Order(OrderUpdate),
    /// `risk` push.
    Risk(RiskStatus),
    /// A `type` this client does not know. Never routed to subscribers.
    Other {
        /// Raw `type` field.
        kind: String,
        /// Raw `data` field.
        data: serde_json::Value,
    },
}

impl Payload {
    /// Category of this payload, `None` for [`Payload::Other`].
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        match self {
            Payload::Dashboard(_) => Some(Category::Dashboard),
            Payload::Order(_) => Some(Category::Order),
            Payload::Risk(_) => Some(Category::Risk),
            Payload::Other { .. } => None,
        }
    }

    /// The wire `type` string.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Payload::Other { kind, .. } => kind,
            known => known.category().map_or("", |c| c.as_str()),
        }
    }

    /// Convert the payload back into its wire `data` value.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload field cannot be represented as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Payload::Dashboard(p) => serde_json::to_value(p),
            Payload::Order(p) => serde_json::to_value(p),
            Payload::Risk(p) => serde_json::to_value(p),
            Payload::Other { data, .. } => Ok(data.clone()),
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Typed payload.
    pub payload: Payload,
    /// Sender timestamp as found on the wire (fractional values truncated).
    pub timestamp: i64,
    /// Local receive time.
    pub received_at: SystemTime,
}

impl Envelope {
    /// Create an envelope received now.
    #[must_use]
    pub fn new(payload: Payload, timestamp: i64) -> Self {
        Self {
            payload,
            timestamp,
            received_at: SystemTime::now(),
        }
    }

    /// Routing category, `None` for unknown types.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.payload.category()
    }
}

/// A payload type bound to exactly one category.
///
/// Used for typed subscriptions: a `Topic` handler only ever sees its own
/// category's payload.
pub trait Topic: Send + Sync + 'static {
    /// Category this payload is routed under.
    const CATEGORY: Category;

    /// Borrow `Self` out of a payload of the matching category.
    fn from_payload(payload: &Payload) -> Option<&Self>;
}

impl Topic for DashboardSnapshot {
    const CATEGORY: Category = Category::Dashboard;

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Dashboard(p) => Some(p),
            _ => None,
        }
    }
}

impl Topic for OrderUpdate {
    const CATEGORY: Category = Category::Order;

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Order(p) => Some(p),
            _ => None,
        }
    }
}

impl Topic for RiskStatus {
    const CATEGORY: Category = Category::Risk;

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Risk(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("dashboard".parse::<Category>(), Ok(Category::Dashboard));
        assert_eq!("order".parse::<Category>(), Ok(Category::Order));
        assert_eq!("risk".parse::<Category>(), Ok(Category::Risk));
        assert!("Dashboard".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_display_matches_wire_name() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn test_other_payload_has_no_category() {
        let payload = Payload::Other {
            kind: "heartbeat".to_string(),
            data: serde_json::Value::Null,
        };
        assert_eq!(payload.category(), None);
        assert_eq!(payload.kind(), "heartbeat");
    }
}
