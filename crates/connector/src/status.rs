//! Readiness report.

use serde::Serialize;
use std::fmt;

/// Which parts of the connector have initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorStatus {
    /// At least one balance fetch has succeeded.
    pub account_balance: bool,
    pub trading_rule_initialized: bool,
    /// At least one user stream record has arrived.
    pub user_stream_initialized: bool,
    /// Set once the exchange refused the credentials.
    pub auth_error: Option<String>,
}

impl ConnectorStatus {
    pub fn is_ready(&self) -> bool {
        self.account_balance
            && self.trading_rule_initialized
            && self.user_stream_initialized
            && self.auth_error.is_none()
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance={} rules={} stream={}",
            self.account_balance, self.trading_rule_initialized, self.user_stream_initialized
        )?;
        if let Some(reason) = &self.auth_error {
            write!(f, " auth_error={}", reason)?;
        }
        Ok(())
    }
}
