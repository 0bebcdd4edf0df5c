//! Exchange-neutral connector contracts.
//!
//! - [`Transport`]: the authenticated boundary every exchange implements
//! - [`UserStreamMessage`]: classified user stream records
//! - [`ExchangeProfile`]: status vocabulary, rate limits and channels as data
//! - [`ConnectorConfig`]: timing and sizing knobs
//! - [`TransportError`] / [`ConnectorError`]: the error taxonomy

mod config;
mod error;
mod messages;
mod profile;
mod transport;

pub use config::{ConfigError, ConnectorConfig};
pub use error::{ConnectorError, ErrorKind, TransportError};
pub use messages::{classify, BalanceUpdate, UserStreamMessage};
pub use profile::{ExchangeProfile, LimitIds, GLOBAL_LIMIT_ID};
pub use transport::{CancelRequest, OrderRequest, PlacedOrder, Transport, UserStream};
