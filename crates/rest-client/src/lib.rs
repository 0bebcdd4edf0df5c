//! Generic REST client infrastructure.
//!
//! A thin wrapper around `reqwest` with:
//!
//! - An explicit per-request timeout
//! - JSON request and response bodies
//! - Header injection for authentication
//! - Status classification into `RestError` (auth, not found, rate limited)
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_client::RestClient;
//! use serde_json::Value;
//!
//! let client = RestClient::with_default_timeout("https://gateway.example.com")?;
//! let balances: Value = client.get("/v1/balances", None, &[]).await?;
//! ```

mod client;
mod error;

pub use client::RestClient;
pub use error::RestError;
