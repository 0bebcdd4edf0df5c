//! Generic REST client wrapper around reqwest.

use crate::error::RestError;
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Generic REST client for making JSON requests.
pub struct RestClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RestClient {
    /// Create a new REST client with the given base URL.
    ///
    /// # Arguments
    /// * `base_url` - Base URL for all requests (e.g., "https://gateway.example.com")
    /// * `timeout` - Request timeout duration
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Create a new REST client with default timeout.
    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Make a GET request.
    ///
    /// # Arguments
    /// * `path` - Request path (e.g., "/v1/balances")
    /// * `query` - Optional query string (without leading '?')
    /// * `headers` - Additional headers (authentication)
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(url = %url, "GET request");
        self.send(self.client.get(&url), headers).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let url = self.build_url(path, None);
        tracing::debug!(url = %url, "POST request");
        self.send(self.client.post(&url).json(body), headers).await
    }

    /// Make a DELETE request whose response body is ignored.
    pub async fn delete_empty(
        &self,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<(), RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(url = %url, "DELETE request (empty response)");

        let response = with_headers(self.client.delete(&url), headers).send().await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let response = with_headers(request, headers).send().await?;
        let response = Self::check_status(response).await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(body = %body, error = %e, "Failed to parse response");
            RestError::Parse(e.to_string())
        })
    }

    /// Build a full URL from path and optional query string.
    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    /// Pass success responses through, classify everything else.
    async fn check_status(response: Response) -> Result<Response, RestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body = response.text().await.unwrap_or_default();
        Err(RestError::from_status(status.as_u16(), body, retry_after_ms))
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (key, value) in headers {
        request = request.header(*key, *value);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_no_query() {
        let client = RestClient::with_default_timeout("https://api.example.com").unwrap();
        assert_eq!(
            client.build_url("/v1/balances", None),
            "https://api.example.com/v1/balances"
        );
    }

    #[test]
    fn test_build_url_with_query() {
        let client = RestClient::with_default_timeout("https://api.example.com").unwrap();
        assert_eq!(
            client.build_url("/v1/orders/42", Some("trading_pair=BTC-USDT")),
            "https://api.example.com/v1/orders/42?trading_pair=BTC-USDT"
        );
    }

    #[test]
    fn test_build_url_strips_trailing_slash() {
        let client = RestClient::with_default_timeout("https://api.example.com/").unwrap();
        assert_eq!(
            client.build_url("/v1/ping", Some("")),
            "https://api.example.com/v1/ping"
        );
    }

    #[test]
    fn test_timeout_is_kept() {
        let client = RestClient::new("http://localhost", Duration::from_secs(3)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }
}
