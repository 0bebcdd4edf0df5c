//! Order side, type and lifecycle state enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Parse the canonical upper-case form.
    pub fn from_canonical_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    LimitMaker,
    Market,
}

impl OrderType {
    /// Parse the canonical upper-case form.
    pub fn from_canonical_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LIMIT" => Some(Self::Limit),
            "LIMIT_MAKER" => Some(Self::LimitMaker),
            "MARKET" => Some(Self::Market),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::LimitMaker => "LIMIT_MAKER",
            Self::Market => "MARKET",
        }
    }

    /// Limit and limit-maker orders rest on the book at a price.
    pub fn is_limit_type(&self) -> bool {
        matches!(self, Self::Limit | Self::LimitMaker)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a tracked order.
///
/// States only move forward:
/// `PendingCreate -> Open -> PartiallyFilled -> {Filled | Canceled | Failed | Expired}`.
/// Any non-terminal state may jump directly to a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Submitted locally, not yet acknowledged by the exchange.
    PendingCreate,
    /// Resting on the exchange.
    Open,
    /// Some but not all of the amount has been executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Canceled by request.
    Canceled,
    /// Rejected or lost.
    Failed,
    /// Expired on the exchange.
    Expired,
}

impl OrderState {
    /// Position along the lifecycle; terminal states share the highest rank.
    fn rank(&self) -> u8 {
        match self {
            Self::PendingCreate => 0,
            Self::Open => 1,
            Self::PartiallyFilled => 2,
            Self::Filled | Self::Canceled | Self::Failed | Self::Expired => 3,
        }
    }

    /// Check if this is a terminal state (order is done).
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Check if the order may still execute.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` is forward progress.
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingCreate => "PENDING_CREATE",
            Self::Open => "OPEN",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a client order id.
///
/// Format: `{prefix}{B|S}{pair without separators}{uuid}` truncated to
/// `max_len` characters (0 means unbounded). Truncation drops the middle so
/// the random uuid tail survives.
pub fn generate_client_order_id(
    prefix: &str,
    side: OrderSide,
    trading_pair: &str,
    max_len: usize,
) -> String {
    let side_tag = match side {
        OrderSide::Buy => 'B',
        OrderSide::Sell => 'S',
    };
    let pair: String = trading_pair
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    let uuid = Uuid::new_v4().as_simple().to_string();

    let id = format!("{}{}{}{}", prefix, side_tag, pair, uuid);
    let chars: Vec<char> = id.chars().collect();
    if max_len == 0 || chars.len() <= max_len {
        return id;
    }

    // Keep the head (prefix, side) and the most random end of the id.
    let head_len = (prefix.chars().count() + 1).min(max_len);
    let tail_len = max_len - head_len;
    chars[..head_len]
        .iter()
        .chain(chars[chars.len() - tail_len..].iter())
        .collect()
}
