use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Info API: clearinghouseState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    ClearinghouseState { user: String },
    Meta,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: Decimal,
    pub total_ntl_pos: Decimal,
    pub total_raw_usd: Decimal,
    pub total_margin_used: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummary,
    #[serde(default)]
    pub withdrawable: Option<Decimal>,
    /// Kept raw so one malformed entry does not fail the whole response.
    #[serde(default)]
    pub asset_positions: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    pub position: ApiPosition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiLeverage {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPosition {
    pub coin: String,
    pub szi: Decimal,
    #[serde(default)]
    pub entry_px: Option<Decimal>,
    pub leverage: ApiLeverage,
    #[serde(default)]
    pub liquidation_px: Option<Decimal>,
    #[serde(default)]
    pub margin_used: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub position_value: Decimal,
}

// ---------------------------------------------------------------------------
// Info API: meta
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default)]
    pub max_leverage: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

// ---------------------------------------------------------------------------
// Exchange API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LimitTif {
    pub tif: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderTypeWire {
    pub limit: LimitTif,
}

/// One order inside an `order` action. Field order matters: it is part of
/// the msgpack hash that gets signed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWire {
    pub a: u32,
    pub b: bool,
    pub p: String,
    pub s: String,
    pub r: bool,
    pub t: OrderTypeWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Order {
        orders: Vec<OrderWire>,
        grouping: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateLeverage {
        asset: u32,
        is_cross: bool,
        leverage: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureWire {
    pub r: String,
    pub s: String,
    pub v: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest<'a> {
    pub action: &'a Action,
    pub nonce: u64,
    pub signature: SignatureWire,
    pub vault_address: Option<String>,
}

/// `{"status":"ok","response":{...}}` or `{"status":"err","response":"msg"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponseBody {
    pub data: OrderResponseData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponseData {
    pub statuses: Vec<OrderStatusWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderStatusWire {
    #[serde(default)]
    pub resting: Option<RestingWire>,
    #[serde(default)]
    pub filled: Option<FilledWire>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestingWire {
    pub oid: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledWire {
    pub oid: u64,
    pub total_sz: String,
    pub avg_px: String,
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WsSubscribe {
    pub method: &'static str,
    pub subscription: WsSubscription,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsSubscription {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: String,
}

impl WsSubscribe {
    pub fn user_fills(user: &str) -> Self {
        Self {
            method: "subscribe",
            subscription: WsSubscription {
                kind: "userFills",
                user: user.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsEnvelope {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsUserFills {
    #[serde(default)]
    pub is_snapshot: bool,
    #[serde(default)]
    pub user: Option<String>,
    pub fills: Vec<WsFill>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsFill {
    pub coin: String,
    pub px: Decimal,
    pub sz: Decimal,
    pub side: String,
    /// Milliseconds since the epoch.
    pub time: i64,
    pub start_position: Decimal,
    pub dir: String,
    #[serde(default)]
    pub closed_pnl: Option<Decimal>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub oid: Option<u64>,
    #[serde(default)]
    pub tid: Option<u64>,
    #[serde(default)]
    pub fee: Option<Decimal>,
}
