//! HMAC-SHA256 request signing.
//!
//! The signed payload is `timestamp + METHOD + path + body`, so a signature
//! cannot be replayed against a different endpoint, method or body.

use crate::credentials::ApiCredentials;
use crate::error::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-API-KEY";
pub const TIMESTAMP_HEADER: &str = "X-TIMESTAMP";
pub const SIGNATURE_HEADER: &str = "X-SIGNATURE";

/// Authentication headers of one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedHeaders {
    /// Header name/value pairs ready to attach to a request.
    pub fn as_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (API_KEY_HEADER, self.api_key.as_str()),
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }
}

/// Request signer for authenticated API calls.
pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    /// Create a new request signer with the given credentials.
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Sign a message and return the lowercase hex HMAC-SHA256 signature.
    pub fn sign(&self, message: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .map_err(|_| AuthError::InvalidSigningKey)?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sign one request.
    ///
    /// # Arguments
    /// * `method` - HTTP method, upper-cased before signing
    /// * `path` - Request path including any query string
    /// * `body` - Raw request body, empty for GET and DELETE
    /// * `timestamp_ms` - Current timestamp in milliseconds
    pub fn sign_request(
        &self,
        method: &str,
        path: &str,
        body: &str,
        timestamp_ms: u64,
    ) -> Result<SignedHeaders, AuthError> {
        let timestamp = timestamp_ms.to_string();
        let payload = format!("{}{}{}{}", timestamp, method.to_ascii_uppercase(), path, body);
        Ok(SignedHeaders {
            api_key: self.credentials.api_key().to_string(),
            signature: self.sign(&payload)?,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // Published HMAC-SHA256 vector from a public exchange API reference.
        let creds = ApiCredentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A".into(),
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
        );
        let signer = RequestSigner::new(&creds);

        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            signer.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_sign_request_payload_layout() {
        let creds = ApiCredentials::new("key".into(), "secret".into());
        let signer = RequestSigner::new(&creds);

        let headers = signer.sign_request("post", "/v1/orders", "{\"a\":1}", 1000).unwrap();
        assert_eq!(headers.api_key, "key");
        assert_eq!(headers.timestamp, "1000");
        assert_eq!(
            headers.signature,
            signer.sign("1000POST/v1/orders{\"a\":1}").unwrap()
        );
    }

    #[test]
    fn test_signature_depends_on_method_and_path() {
        let creds = ApiCredentials::new("key".into(), "secret".into());
        let signer = RequestSigner::new(&creds);

        let get = signer.sign_request("GET", "/v1/orders/1", "", 1000).unwrap();
        let delete = signer.sign_request("DELETE", "/v1/orders/1", "", 1000).unwrap();
        let other = signer.sign_request("GET", "/v1/orders/2", "", 1000).unwrap();
        assert_ne!(get.signature, delete.signature);
        assert_ne!(get.signature, other.signature);
    }

    #[test]
    fn test_header_pairs() {
        let creds = ApiCredentials::new("key".into(), "secret".into());
        let headers = RequestSigner::new(&creds)
            .sign_request("GET", "/v1/ping", "", 5)
            .unwrap();
        let pairs = headers.as_pairs();
        assert_eq!(pairs[0], (API_KEY_HEADER, "key"));
        assert_eq!(pairs[1], (TIMESTAMP_HEADER, "5"));
        assert_eq!(pairs[2].1.len(), 64);
    }
}
