//! Credentials and HMAC-SHA256 request signing for the exchange gateway.
//!
//! Every authenticated request carries the API key, a millisecond timestamp
//! and a hex signature over `timestamp + METHOD + path + body`.
//!
//! ```rust,ignore
//! let credentials = auth::ApiCredentials::from_env()?;
//! let headers = auth::RequestSigner::new(&credentials)
//!     .sign_request("GET", "/v1/balances", "", now_ms)?;
//! ```

mod credentials;
mod error;
mod signer;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use signer::{
    RequestSigner, SignedHeaders, API_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
