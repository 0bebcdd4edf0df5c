//! Transport for exchanges reached through the canonical gateway.
//!
//! The gateway speaks JSON over REST for requests and over a WebSocket for
//! the user stream. Records are tagged by `"kind"` (`order`, `trade`,
//! `balance`) and carry decimals as strings, so no exchange-specific parsing
//! lives in this crate.
//!
//! Every request is signed with the HMAC scheme from the `auth` crate.

mod config;
mod error;
mod stream;
mod transport;

pub use config::{GatewayConfig, GatewayConfigError};
pub use transport::GatewayTransport;
