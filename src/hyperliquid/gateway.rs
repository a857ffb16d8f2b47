use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::RwLock;

use super::exchange_client::ExchangeClient;
use super::info_client::InfoClient;
use super::types::{Action, LimitTif, OrderStatusWire, OrderTypeWire, OrderWire};
use crate::errors::GatewayError;
use crate::gateway::{ExchangeGateway, FilledOrder, OrderRequest, OrderResponse, RestingOrder, TimeInForce};
use crate::models::{AccountEquity, Position, WireDecimal};

/// Significant figures the exchange accepts on prices.
const PRICE_SIG_FIGS: u32 = 5;
/// Max price decimals for perps before subtracting the asset's size decimals.
const MAX_PERP_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetInfo {
    pub index: u32,
    pub sz_decimals: u32,
    pub max_leverage: Option<u32>,
}

/// [`ExchangeGateway`] backed by the Hyperliquid REST API.
///
/// Without an [`ExchangeClient`] the gateway is read-only and every trading
/// call fails with a signing error.
pub struct HyperliquidGateway {
    info: InfoClient,
    exchange: Option<ExchangeClient>,
    assets: RwLock<HashMap<String, AssetInfo>>,
}

impl HyperliquidGateway {
    pub fn new(info: InfoClient, exchange: Option<ExchangeClient>) -> Self {
        Self {
            info,
            exchange,
            assets: RwLock::new(HashMap::new()),
        }
    }

    fn exchange(&self) -> Result<&ExchangeClient, GatewayError> {
        self.exchange
            .as_ref()
            .ok_or_else(|| GatewayError::Signing("no signing key configured".into()))
    }

    /// Asset metadata, refreshing the cache once for coins it does not know.
    pub async fn asset(&self, coin: &str) -> Result<AssetInfo, GatewayError> {
        if let Some(info) = self.assets.read().await.get(coin) {
            return Ok(*info);
        }

        let meta = self.info.meta().await?;
        let mut assets = self.assets.write().await;
        assets.clear();
        for (index, asset) in meta.universe.into_iter().enumerate() {
            assets.insert(
                asset.name,
                AssetInfo {
                    index: index as u32,
                    sz_decimals: asset.sz_decimals,
                    max_leverage: asset.max_leverage,
                },
            );
        }
        tracing::debug!(assets = assets.len(), "Asset metadata refreshed");

        assets
            .get(coin)
            .copied()
            .ok_or_else(|| GatewayError::UnknownAsset(coin.to_string()))
    }
}

/// Round a size down to the asset's size decimals.
pub fn round_size(size: Decimal, sz_decimals: u32) -> Decimal {
    size.round_dp_with_strategy(sz_decimals, RoundingStrategy::ToZero)
}

/// Round a price to 5 significant figures and at most `6 - szDecimals` decimals.
pub fn round_price(price: Decimal, sz_decimals: u32) -> Decimal {
    let max_decimals = MAX_PERP_DECIMALS.saturating_sub(sz_decimals);
    price
        .round_sf(PRICE_SIG_FIGS)
        .unwrap_or(price)
        .round_dp(max_decimals)
}

fn tif_wire(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Gtc => "Gtc",
        TimeInForce::Ioc => "Ioc",
        TimeInForce::Alo => "Alo",
    }
}

fn order_response(status: OrderStatusWire) -> OrderResponse {
    OrderResponse {
        resting: status.resting.map(|r| RestingOrder { order_id: r.oid }),
        filled: status.filled.map(|f| FilledOrder {
            order_id: f.oid,
            total_size: f.total_sz,
            average_price: f.avg_px,
        }),
        error: status.error,
    }
}

#[async_trait]
impl ExchangeGateway for HyperliquidGateway {
    async fn account_equity(&self, address: &str) -> Result<AccountEquity, GatewayError> {
        self.info.account_equity(address).await
    }

    async fn positions(&self, address: &str) -> Result<Vec<Position>, GatewayError> {
        self.info.positions(address).await
    }

    async fn update_leverage(&self, coin: &str, leverage: u32) -> Result<(), GatewayError> {
        let exchange = self.exchange()?;
        let asset = self.asset(coin).await?;
        let leverage = match asset.max_leverage {
            Some(max) if leverage > max => {
                tracing::debug!(coin, requested = leverage, max, "Clamping leverage to asset max");
                max
            }
            _ => leverage,
        };

        exchange
            .submit(&Action::UpdateLeverage {
                asset: asset.index,
                is_cross: true,
                leverage,
            })
            .await?;
        tracing::debug!(coin, leverage, "Leverage updated");
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        let exchange = self.exchange()?;
        let asset = self.asset(&order.coin).await?;

        let size = round_size(order.size.to_decimal(), asset.sz_decimals);
        if size <= Decimal::ZERO {
            return Err(GatewayError::rejected(format!(
                "size {} rounds to zero at {} decimals",
                order.size, asset.sz_decimals
            )));
        }
        let price = round_price(order.limit_price.to_decimal(), asset.sz_decimals);

        let action = Action::Order {
            orders: vec![OrderWire {
                a: asset.index,
                b: order.side.is_buy(),
                p: WireDecimal::from(price).as_str().to_string(),
                s: WireDecimal::from(size).as_str().to_string(),
                r: order.reduce_only,
                t: OrderTypeWire {
                    limit: LimitTif {
                        tif: tif_wire(order.time_in_force).to_string(),
                    },
                },
                c: order.client_order_id.clone(),
            }],
            grouping: "na".into(),
        };

        let status = exchange.place_order(&action).await?;
        Ok(order_response(status))
    }
}
