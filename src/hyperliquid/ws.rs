use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::types::{WsEnvelope, WsFill, WsSubscribe, WsUserFills};
use crate::errors::GatewayError;
use crate::gateway::{DecodeError, FillConnection, FillMessage, FillTransport};
use crate::models::{Direction, FillEvent, Side};

/// Application-level keepalive; the server drops connections idle for 60s.
const PING_INTERVAL: Duration = Duration::from_secs(50);
const PING_MESSAGE: &str = r#"{"method":"ping"}"#;

/// `userFills` subscriptions over the Hyperliquid WebSocket API.
#[derive(Debug, Clone)]
pub struct HyperliquidFillTransport {
    url: Url,
}

impl HyperliquidFillTransport {
    /// Fails only when the URL itself is unusable.
    pub fn new(ws_url: &str) -> Result<Self, GatewayError> {
        let url = Url::parse(ws_url)
            .map_err(|e| GatewayError::WebSocket(format!("invalid url {ws_url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(GatewayError::WebSocket(format!(
                "unsupported scheme {} in {ws_url}",
                url.scheme()
            )));
        }
        Ok(Self { url })
    }
}

#[async_trait]
impl FillTransport for HyperliquidFillTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn FillConnection>, GatewayError> {
        let (mut stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;

        let subscribe = serde_json::to_string(&WsSubscribe::user_fills(address))
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
        stream
            .send(Message::Text(subscribe.into()))
            .await
            .map_err(|e| GatewayError::WebSocket(format!("subscribe failed: {e}")))?;

        let mut ping = interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.reset();

        Ok(Box::new(WsConnection { stream, ping }))
    }

    fn decode(&self, raw: &str) -> Result<FillMessage, DecodeError> {
        decode_message(raw)
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ping: Interval,
}

#[async_trait]
impl FillConnection for WsConnection {
    async fn recv(&mut self) -> Option<String> {
        loop {
            tokio::select! {
                msg = self.stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.stream.send(Message::Pong(data)).await {
                            tracing::warn!(error = %e, "Failed to send pong");
                            return None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::warn!(?frame, "WebSocket server sent close frame");
                        return None;
                    }
                    Some(Ok(_)) => {} // Binary, Pong, Frame: ignore
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket read error");
                        return None;
                    }
                    None => {
                        tracing::warn!("WebSocket stream ended");
                        return None;
                    }
                },
                _ = self.ping.tick() => {
                    if let Err(e) = self.stream.send(Message::Text(PING_MESSAGE.to_string().into())).await {
                        tracing::warn!(error = %e, "Failed to send ping");
                        return None;
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}

/// Decode one raw frame from the WebSocket API.
pub fn decode_message(raw: &str) -> Result<FillMessage, DecodeError> {
    let envelope: WsEnvelope =
        serde_json::from_str(raw).map_err(|e| DecodeError(e.to_string()))?;

    match envelope.channel.as_str() {
        "userFills" => {
            let batch: WsUserFills =
                serde_json::from_value(envelope.data).map_err(|e| DecodeError(e.to_string()))?;
            if batch.is_snapshot {
                return Ok(FillMessage::Snapshot(batch.fills.len()));
            }
            let fills = batch.fills.into_iter().filter_map(to_fill_event).collect();
            Ok(FillMessage::Fills(fills))
        }
        "error" => {
            tracing::warn!(data = %envelope.data, "WebSocket API error message");
            Ok(FillMessage::Ignored)
        }
        other => {
            tracing::trace!(channel = other, "Non-fill message received");
            Ok(FillMessage::Ignored)
        }
    }
}

fn to_fill_event(fill: WsFill) -> Option<FillEvent> {
    let Some(side) = Side::from_api_str(&fill.side) else {
        tracing::warn!(coin = %fill.coin, side = %fill.side, "Unknown fill side, dropping fill");
        return None;
    };

    Some(FillEvent {
        direction: Direction::from_api_str(&fill.dir),
        timestamp: DateTime::from_timestamp_millis(fill.time).unwrap_or_else(Utc::now),
        coin: fill.coin,
        price: fill.px,
        size: fill.sz,
        side,
        start_position: fill.start_position,
        hash: fill.hash,
        order_id: fill.oid,
        trade_id: fill.tid,
        closed_pnl: fill.closed_pnl,
        fee: fill.fee,
    })
}
