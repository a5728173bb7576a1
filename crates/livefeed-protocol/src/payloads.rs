//! Payload shapes for each category.
//!
//! Field names follow the backend's camelCase JSON. Monetary and leverage
//! values are decimal strings; the backend is not consistent about quoting
//! them, so numbers are accepted too and kept in their textual form.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Text(String),
    Number(serde_json::Number),
}

impl DecimalRepr {
    fn into_string(self) -> String {
        match self {
            DecimalRepr::Text(s) => s,
            DecimalRepr::Number(n) => n.to_string(),
        }
    }
}

fn decimal<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    DecimalRepr::deserialize(deserializer).map(DecimalRepr::into_string)
}

fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DecimalRepr>::deserialize(deserializer)?.map(DecimalRepr::into_string))
}

/// Health of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Operating normally.
    Normal,
    /// Degraded but serving.
    Warning,
    /// Failing.
    Error,
}

/// One row of the system health panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthItem {
    /// Subsystem name.
    pub name: String,
    /// Current health.
    pub status: HealthStatus,
    /// Round-trip latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    /// Time of the last heartbeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
    /// Operator-facing detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Macro cooling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoolingMode {
    /// Trading paused around a macro event.
    Active,
    /// No cooling window in effect.
    Inactive,
}

/// Leverage regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeverageStatus {
    /// Full leverage allowed.
    Relaxed,
    /// Leverage reduced after losses.
    Restricted,
}

/// Risk control state, pushed alone under `risk` and embedded in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    /// Losing trades in a row.
    pub consecutive_losses: u32,
    /// Losses in a row that trigger restriction.
    pub max_consecutive_losses: u32,
    /// Macro cooling state.
    pub macro_cooling_mode: CoolingMode,
    /// Start of the next macro window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_macro_window: Option<String>,
    /// Leverage regime.
    pub leverage_status: LeverageStatus,
    /// Leverage ceiling.
    #[serde(deserialize_with = "decimal")]
    pub max_leverage: String,
    /// Leverage in use.
    #[serde(deserialize_with = "decimal")]
    pub current_leverage: String,
}

/// Position direction of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Net long.
    Long,
    /// Net short.
    Short,
    /// No position, sent as `N/A`.
    #[serde(rename = "N/A")]
    NotApplicable,
}

/// Run state of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    /// Trading.
    Running,
    /// Halted.
    Stopped,
    /// Paused by a risk rule.
    Cooling,
}

/// Summary row for one running strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOverview {
    /// Strategy identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Traded instrument.
    pub symbol: String,
    /// Position direction.
    pub direction: Direction,
    /// Run state.
    pub status: StrategyStatus,
    /// Fraction of winning trades, 0 to 1.
    pub win_rate: f64,
    /// Why the strategy is stopped or cooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of a `dashboard` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Profit and loss for the day.
    #[serde(deserialize_with = "decimal")]
    pub pnl_daily: String,
    /// Daily profit and loss as a percentage of equity.
    #[serde(deserialize_with = "decimal")]
    pub pnl_percent: String,
    /// Account equity.
    #[serde(deserialize_with = "decimal")]
    pub total_equity: String,
    /// Open exposure.
    #[serde(deserialize_with = "decimal")]
    pub risk_exposure: String,
    /// Drawdown since the start of the day.
    #[serde(deserialize_with = "decimal")]
    pub daily_drawdown: String,
    /// Per-subsystem health.
    #[serde(default)]
    pub system_health: Vec<SystemHealthItem>,
    /// Risk control state.
    pub risk_status: RiskStatus,
    /// Strategy summaries.
    #[serde(default)]
    pub strategies: Vec<StrategyOverview>,
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

/// Order execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Rests at a price.
    Limit,
    /// Fills at the best price.
    Market,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, not yet sent.
    Pending,
    /// Accepted by the exchange.
    Submitted,
    /// Partly filled.
    PartialFilled,
    /// Completely filled.
    Filled,
    /// Cancelled before completing.
    Cancelled,
    /// Refused by the exchange.
    Rejected,
}

impl OrderStatus {
    /// Whether the order can still change.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartialFilled
        )
    }
}

/// Payload of an `order` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    /// Idempotency key assigned by the trading engine.
    pub client_order_id: String,
    /// Exchange-assigned order id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
    /// Traded instrument.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Limit price.
    #[serde(
        default,
        deserialize_with = "optional_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<String>,
    /// Ordered quantity.
    #[serde(
        default,
        deserialize_with = "optional_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<String>,
    /// Quantity filled so far.
    #[serde(
        default,
        deserialize_with = "optional_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub filled: Option<String>,
    /// Time of the last change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_status_accepts_numeric_and_string_leverage() {
        let risk: RiskStatus = serde_json::from_value(json!({
            "consecutiveLosses": 2,
            "maxConsecutiveLosses": 5,
            "macroCoolingMode": "active",
            "nextMacroWindow": "2024-05-01T12:30:00Z",
            "leverageStatus": "restricted",
            "maxLeverage": "2.0",
            "currentLeverage": 1.5
        }))
        .unwrap();

        assert_eq!(risk.max_leverage, "2.0");
        assert_eq!(risk.current_leverage, "1.5");
        assert_eq!(risk.macro_cooling_mode, CoolingMode::Active);
        assert_eq!(risk.leverage_status, LeverageStatus::Restricted);
    }

    #[test]
    fn test_strategy_direction_not_applicable() {
        let strategy: StrategyOverview = serde_json::from_value(json!({
            "id": "s-1",
            "name": "grid",
            "symbol": "BTCUSDT",
            "direction": "N/A",
            "status": "cooling",
            "winRate": 0.42,
            "reason": "macro window"
        }))
        .unwrap();

        assert_eq!(strategy.direction, Direction::NotApplicable);
        assert_eq!(strategy.status, StrategyStatus::Cooling);
    }

    #[test]
    fn test_order_update_optional_fields() {
        let order: OrderUpdate = serde_json::from_value(json!({
            "clientOrderId": "c-1",
            "symbol": "ETHUSDT",
            "side": "SELL",
            "status": "PARTIAL_FILLED",
            "quantity": 3,
            "filled": "1.25"
        }))
        .unwrap();

        assert_eq!(order.side, OrderSide::Sell);
        assert!(order.status.is_active());
        assert_eq!(order.quantity.as_deref(), Some("3"));
        assert_eq!(order.filled.as_deref(), Some("1.25"));
        assert_eq!(order.price, None);
        assert_eq!(order.order_type, None);
    }

    #[test]
    fn test_order_update_rejects_unknown_status() {
        let result: Result<OrderUpdate, _> = serde_json::from_value(json!({
            "clientOrderId": "c-1",
            "symbol": "ETHUSDT",
            "side": "BUY",
            "status": "EXPLODED"
        }));
        assert!(result.is_err());
    }
}
