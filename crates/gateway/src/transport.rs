//! [`Transport`] over the gateway's canonical REST API and user stream.

use crate::config::GatewayConfig;
use crate::error::{from_auth, from_rest};
use crate::stream::open_user_stream;
use async_trait::async_trait;
use auth::{ApiCredentials, RequestSigner};
use common::now_ms;
use connector_core::{
    BalanceUpdate, CancelRequest, OrderRequest, PlacedOrder, Transport, TransportError, UserStream,
};
use execution_core::{Balance, OrderUpdate, TradeUpdate, TradingRule};
use rest_client::RestClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const PING_PATH: &str = "/v1/ping";
const ORDERS_PATH: &str = "/v1/orders";
const BALANCES_PATH: &str = "/v1/balances";
const TRADING_RULES_PATH: &str = "/v1/trading-rules";

#[derive(Debug, Deserialize)]
struct Ack {}

/// Gateway-backed transport.
pub struct GatewayTransport {
    config: GatewayConfig,
    rest: RestClient,
    credentials: ApiCredentials,
}

impl GatewayTransport {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig, credentials: ApiCredentials) -> Result<Self, TransportError> {
        let rest = RestClient::new(&config.rest_url, config.request_timeout)
            .map_err(|e| from_rest(e, config.request_timeout))?;
        Ok(Self {
            config,
            rest,
            credentials,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn signed(&self, method: &str, path: &str, body: &str) -> Result<[(String, String); 3], TransportError> {
        let headers = RequestSigner::new(&self.credentials)
            .sign_request(method, path, body, now_ms())
            .map_err(from_auth)?;
        Ok(headers.as_pairs().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<T, TransportError> {
        let signed_path = match query {
            Some(q) => format!("{}?{}", path, q),
            None => path.to_string(),
        };
        let headers = self.signed("GET", &signed_path, "")?;
        let refs = header_refs(&headers);
        self.rest
            .get(path, query, &refs)
            .await
            .map_err(|e| from_rest(e, self.config.request_timeout))
    }
}

fn header_refs(headers: &[(String, String); 3]) -> [(&str, &str); 3] {
    [
        (headers[0].0.as_str(), headers[0].1.as_str()),
        (headers[1].0.as_str(), headers[1].1.as_str()),
        (headers[2].0.as_str(), headers[2].1.as_str()),
    ]
}

/// Path of one order's resource.
pub(crate) fn order_path(exchange_order_id: &str) -> String {
    format!("{}/{}", ORDERS_PATH, exchange_order_id)
}

pub(crate) fn pair_query(trading_pair: &str) -> String {
    format!("trading_pair={}", trading_pair)
}

/// Collapse a balance list into the `asset -> Balance` map.
pub(crate) fn balances_to_map(records: Vec<BalanceUpdate>) -> HashMap<String, Balance> {
    records
        .into_iter()
        .map(|b| (b.asset, Balance::new(b.total, b.available)))
        .collect()
}

#[async_trait]
impl Transport for GatewayTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn check_network(&self) -> Result<(), TransportError> {
        let _: Ack = self.signed_get(PING_PATH, None).await?;
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, TransportError> {
        let body = serde_json::to_string(request)?;
        let headers = self.signed("POST", ORDERS_PATH, &body)?;
        let refs = header_refs(&headers);
        debug!(client_order_id = %request.client_order_id, "Submitting order to gateway");
        self.rest
            .post_json(ORDERS_PATH, request, &refs)
            .await
            .map_err(|e| from_rest(e, self.config.request_timeout))
    }

    async fn cancel_order(&self, request: &CancelRequest) -> Result<(), TransportError> {
        let path = order_path(&request.exchange_order_id);
        let query = format!(
            "{}&client_order_id={}",
            pair_query(&request.trading_pair),
            request.client_order_id
        );
        let headers = self.signed("DELETE", &format!("{}?{}", path, query), "")?;
        let refs = header_refs(&headers);
        self.rest
            .delete_empty(&path, Some(&query), &refs)
            .await
            .map_err(|e| from_rest(e, self.config.request_timeout))
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>, TransportError> {
        let records: Vec<BalanceUpdate> = self.signed_get(BALANCES_PATH, None).await?;
        Ok(balances_to_map(records))
    }

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
        trading_pair: &str,
    ) -> Result<OrderUpdate, TransportError> {
        self.signed_get(&order_path(exchange_order_id), Some(&pair_query(trading_pair)))
            .await
    }

    async fn get_trade_fills(
        &self,
        exchange_order_id: &str,
        trading_pair: &str,
    ) -> Result<Vec<TradeUpdate>, TransportError> {
        let path = format!("{}/trades", order_path(exchange_order_id));
        self.signed_get(&path, Some(&pair_query(trading_pair))).await
    }

    async fn get_trading_rules(&self) -> Result<Vec<TradingRule>, TransportError> {
        self.signed_get(TRADING_RULES_PATH, None).await
    }

    async fn subscribe(&self, channels: &[String]) -> Result<UserStream, TransportError> {
        open_user_stream(
            &self.config.ws_url,
            &self.credentials,
            channels,
            self.config.connect_timeout,
            self.config.stream_buffer,
        )
        .await
    }
}
