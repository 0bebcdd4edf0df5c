//! User stream message classification.
//!
//! Every pushed message is sorted into one of the [`UserStreamMessage`]
//! variants before anything acts on it. Canonical records carry a `"kind"`
//! tag:
//! - `order` - order status change
//! - `trade` - a fill
//! - `balance` - one asset's new total and available amounts
//!
//! `heartbeat`, `pong` and `subscribed` are session control records. Any
//! other shape is unknown.

use execution_core::{OrderUpdate, TradeUpdate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// New balance of one asset, pushed by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub asset: String,
    pub total: Decimal,
    pub available: Decimal,
}

/// A classified user stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum UserStreamMessage {
    Order(OrderUpdate),
    Trade(TradeUpdate),
    Balance(BalanceUpdate),
    /// Heartbeats and subscription acks.
    Control(Value),
    /// Unrecognized kind, or no kind at all.
    Unknown(Value),
}

impl UserStreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Trade(_) => "trade",
            Self::Balance(_) => "balance",
            Self::Control(_) => "control",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Classify a canonical record by its `"kind"` tag.
///
/// A missing or unrecognized tag yields [`UserStreamMessage::Unknown`]; a
/// recognized tag whose body does not decode is an error.
pub fn classify(value: &Value) -> Result<UserStreamMessage, serde_json::Error> {
    match value.get("kind").and_then(|v| v.as_str()) {
        Some("order") => Ok(UserStreamMessage::Order(serde_json::from_value(value.clone())?)),
        Some("trade") => Ok(UserStreamMessage::Trade(serde_json::from_value(value.clone())?)),
        Some("balance") => Ok(UserStreamMessage::Balance(serde_json::from_value(value.clone())?)),
        Some("heartbeat" | "pong" | "subscribed") => Ok(UserStreamMessage::Control(value.clone())),
        _ => Ok(UserStreamMessage::Unknown(value.clone())),
    }
}
