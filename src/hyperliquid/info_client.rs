use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{AssetPosition, ClearinghouseState, InfoRequest, Meta};
use crate::errors::GatewayError;
use crate::models::{AccountEquity, Leverage, LeverageKind, Position};

/// Read-only `/info` endpoint client.
#[derive(Debug, Clone)]
pub struct InfoClient {
    http: Client,
    base_url: String,
}

impl InfoClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Margin summary and open positions for an address.
    pub async fn clearinghouse_state(&self, user: &str) -> Result<ClearinghouseState, GatewayError> {
        self.post(&InfoRequest::ClearinghouseState {
            user: user.to_string(),
        })
        .await
    }

    /// Perp universe: asset index is the position in `universe`.
    pub async fn meta(&self) -> Result<Meta, GatewayError> {
        self.post(&InfoRequest::Meta).await
    }

    pub async fn account_equity(&self, user: &str) -> Result<AccountEquity, GatewayError> {
        let state = self.clearinghouse_state(user).await?;
        Ok(equity_from_state(&state))
    }

    pub async fn positions(&self, user: &str) -> Result<Vec<Position>, GatewayError> {
        let state = self.clearinghouse_state(user).await?;
        Ok(positions_from_state(&state))
    }

    async fn post<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T, GatewayError> {
        let url = format!("{}/info", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
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
            return Err(GatewayError::Account(format!("HTTP {status}: {body}")));
        }

        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Account(format!("malformed info response: {e}")))
    }
}

pub fn equity_from_state(state: &ClearinghouseState) -> AccountEquity {
    let summary = &state.margin_summary;
    AccountEquity {
        account_value: summary.account_value,
        total_margin_used: summary.total_margin_used,
        total_notional_position: summary.total_ntl_pos,
        total_raw_usd: summary.total_raw_usd,
        withdrawable: state.withdrawable.unwrap_or_default(),
    }
}

/// Decode each `assetPositions` entry on its own, skipping the malformed ones.
pub fn positions_from_state(state: &ClearinghouseState) -> Vec<Position> {
    state
        .asset_positions
        .iter()
        .filter_map(|raw| match serde_json::from_value::<AssetPosition>(raw.clone()) {
            Ok(entry) => Some(entry.position),
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "Skipping malformed position entry");
                None
            }
        })
        .map(|p| Position {
            leverage: Leverage {
                kind: if p.leverage.kind.eq_ignore_ascii_case("isolated") {
                    LeverageKind::Isolated
                } else {
                    LeverageKind::Cross
                },
                value: p.leverage.value,
            },
            coin: p.coin,
            size: p.szi,
            entry_price: p.entry_px,
            liquidation_price: p.liquidation_px,
            margin_used: p.margin_used,
            unrealized_pnl: p.unrealized_pnl,
            position_value: p.position_value,
        })
        .collect()
}
