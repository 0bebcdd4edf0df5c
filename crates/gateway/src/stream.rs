//! User stream WebSocket session.
//!
//! The handshake and the signed subscribe frame happen before
//! [`open_user_stream`] returns, so credential and connection problems reach
//! the caller directly. After that a pump task forwards every JSON frame into
//! the returned channel until the socket closes, an error occurs, or the
//! receiver is dropped.

use crate::error::{from_auth, from_ws};
use auth::{ApiCredentials, RequestSigner};
use common::now_ms;
use connector_core::{TransportError, UserStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Path signed for the subscribe frame.
const SUBSCRIBE_PATH: &str = "/ws/subscribe";

/// Build the signed subscribe frame.
pub(crate) fn subscribe_frame(
    credentials: &ApiCredentials,
    channels: &[String],
    timestamp_ms: u64,
) -> Result<Value, TransportError> {
    let body = channels.join(",");
    let headers = RequestSigner::new(credentials)
        .sign_request("GET", SUBSCRIBE_PATH, &body, timestamp_ms)
        .map_err(from_auth)?;
    Ok(json!({
        "op": "subscribe",
        "channels": channels,
        "api_key": headers.api_key,
        "timestamp": headers.timestamp,
        "signature": headers.signature,
    }))
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for control frames (subscription acks), `Ok(Some)` for
/// records, and an error for undecodable frames or gateway error frames.
pub(crate) fn parse_frame(text: &str) -> Result<Option<Value>, TransportError> {
    let value: Value = serde_json::from_str(text)?;
    match value.get("kind").and_then(|k| k.as_str()) {
        Some("subscribed") => Ok(None),
        Some("error") => {
            let code = value.get("code").and_then(|c| c.as_str()).unwrap_or_default();
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(code)
                .to_string();
            if code.eq_ignore_ascii_case("unauthorized") {
                Err(TransportError::Authentication(message))
            } else {
                Err(TransportError::Connection(message))
            }
        }
        _ => Ok(Some(value)),
    }
}

/// Connect, subscribe, and start forwarding frames.
pub(crate) async fn open_user_stream(
    url: &str,
    credentials: &ApiCredentials,
    channels: &[String],
    connect_timeout: Duration,
    buffer: usize,
) -> Result<UserStream, TransportError> {
    let (ws_stream, _) = match tokio::time::timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => return Err(from_ws(e)),
        Err(_) => return Err(TransportError::Timeout(connect_timeout)),
    };

    let (mut write, mut read) = ws_stream.split();
    let frame = subscribe_frame(credentials, channels, now_ms())?;
    write
        .send(Message::Text(frame.to_string()))
        .await
        .map_err(from_ws)?;
    info!(url = %url, channels = ?channels, "Subscribed to user stream");

    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = tx.closed() => {
                    debug!("User stream receiver dropped, closing socket");
                    let _ = write.close().await;
                    return;
                }

                msg_opt = read.next() => {
                    match msg_opt {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            Ok(Some(value)) => {
                                if tx.send(Ok(value)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => debug!("User stream control frame"),
                            Err(e) => {
                                let fatal = !matches!(e, TransportError::Parse(_));
                                if tx.send(Err(e)).await.is_err() || fatal {
                                    let _ = write.close().await;
                                    return;
                                }
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!(error = %e, "Failed to send Pong");
                                let _ = tx.send(Err(from_ws(e))).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("User stream closed by server");
                            return;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "User stream socket error");
                            let _ = tx.send(Err(from_ws(e))).await;
                            return;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    });

    Ok(rx)
}
