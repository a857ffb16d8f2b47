use reqwest::{Client, StatusCode};

use super::signing::{ActionSigner, NonceSource};
use super::types::{Action, ExchangeRequest, ExchangeResponse, OrderResponseBody, OrderStatusWire};
use crate::errors::GatewayError;

/// Signed `/exchange` endpoint client.
pub struct ExchangeClient {
    http: Client,
    base_url: String,
    signer: ActionSigner,
    nonces: NonceSource,
}

impl ExchangeClient {
    pub fn new(http: Client, base_url: impl Into<String>, signer: ActionSigner) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
            nonces: NonceSource::default(),
        }
    }

    pub fn signer(&self) -> &ActionSigner {
        &self.signer
    }

    /// Sign and submit an action. Returns the `response` payload of an `ok` reply.
    pub async fn submit(&self, action: &Action) -> Result<serde_json::Value, GatewayError> {
        let nonce = self.nonces.next();
        let signature = self.signer.sign_action(action, nonce)?;
        let request = ExchangeRequest {
            action,
            nonce,
            signature,
            vault_address: self.signer.vault().map(|v| v.to_string().to_lowercase()),
        };

        let url = format!("{}/exchange", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited(format!("{url} returned 429")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        if status.is_server_error() {
            return Err(GatewayError::Network(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            return Err(GatewayError::rejected(format!("HTTP {status}: {body}")));
        }

        let reply: ExchangeResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::ambiguous(format!("undecodable exchange reply: {e}")))?;

        if reply.status != "ok" {
            let message = match reply.response {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(GatewayError::rejected(message));
        }
        Ok(reply.response)
    }

    /// Submit an `order` action holding a single order and return its status.
    pub async fn place_order(&self, action: &Action) -> Result<OrderStatusWire, GatewayError> {
        let response = self.submit(action).await?;
        let body: OrderResponseBody = serde_json::from_value(response)
            .map_err(|e| GatewayError::ambiguous(format!("unexpected order reply: {e}")))?;
        Ok(body.data.statuses.into_iter().next().unwrap_or_default())
    }
}
