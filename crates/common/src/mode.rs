//! Trading mode selection.
//!
//! `Live` routes orders through the gateway transport, `Paper` simulates fills
//! locally without touching an exchange.

use std::fmt;
use std::str::FromStr;

/// Where orders are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingMode {
    /// Simulated execution (no exchange access).
    #[default]
    Paper,
    /// Real execution through the configured gateway.
    Live,
}

impl TradingMode {
    /// Returns true if orders reach a real exchange.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Returns true if orders are simulated.
    pub fn is_paper(&self) -> bool {
        matches!(self, Self::Paper)
    }

    /// Load the mode from the `CONNECTOR_MODE` env var.
    ///
    /// Returns `Paper` if not set or invalid, so a misconfigured process never
    /// trades real funds.
    pub fn from_env() -> Self {
        std::env::var("CONNECTOR_MODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = ParseTradingModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" | "real" | "production" | "prod" => Ok(Self::Live),
            "paper" | "dry-run" | "dry_run" | "simulated" => Ok(Self::Paper),
            _ => Err(ParseTradingModeError(s.to_string())),
        }
    }
}

/// Error parsing a trading mode string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid trading mode '{0}', expected 'live' or 'paper'")]
pub struct ParseTradingModeError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("live".parse::<TradingMode>().unwrap(), TradingMode::Live);
        assert_eq!("PROD".parse::<TradingMode>().unwrap(), TradingMode::Live);
        assert_eq!("paper".parse::<TradingMode>().unwrap(), TradingMode::Paper);
        assert_eq!(" dry-run ".parse::<TradingMode>().unwrap(), TradingMode::Paper);
    }

    #[test]
    fn test_parse_invalid_mode() {
        let err = "margin".parse::<TradingMode>().unwrap_err();
        assert!(err.to_string().contains("margin"));
    }

    #[test]
    fn test_default_is_paper() {
        assert!(TradingMode::default().is_paper());
        assert!(!TradingMode::default().is_live());
    }

    #[test]
    fn test_display_round_trip() {
        for mode in [TradingMode::Live, TradingMode::Paper] {
            assert_eq!(mode.to_string().parse::<TradingMode>().unwrap(), mode);
        }
    }
}
