use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use hypercopy::errors::GatewayError;
use hypercopy::gateway::{
    DecodeError, ExchangeGateway, FillConnection, FillMessage, FillTransport, OrderRequest,
    OrderResponse, RestingOrder,
};
use hypercopy::hyperliquid::ws::decode_message;
use hypercopy::models::{
    AccountEquity, CopyTradeParams, Direction, FillEvent, HealthCheckResult, Leverage,
    LeverageKind, Position, Side, TradeResult,
};
use hypercopy::services::notifier::NotificationSink;

pub const OUR_ADDRESS: &str = "0x2222222222222222222222222222222222222222";
pub const TARGET_ADDRESS: &str = "0x1111111111111111111111111111111111111111";

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// In-memory exchange. Unscripted orders rest with increasing ids.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockGateway {
    equities: Mutex<HashMap<String, AccountEquity>>,
    positions: Mutex<HashMap<String, Vec<Position>>>,
    equity_failures: Mutex<VecDeque<GatewayError>>,
    order_responses: Mutex<VecDeque<Result<OrderResponse, GatewayError>>>,
    orders: Mutex<Vec<OrderRequest>>,
    leverage_calls: Mutex<Vec<(String, u32)>>,
    next_order_id: AtomicU64,
}

#[allow(dead_code)]
impl MockGateway {
    pub fn with_equities(ours: Decimal, target: Decimal) -> Self {
        let gateway = Self::default();
        gateway.set_equity(OUR_ADDRESS, ours);
        gateway.set_equity(TARGET_ADDRESS, target);
        gateway
    }

    pub fn set_equity(&self, address: &str, account_value: Decimal) {
        self.equities.lock().unwrap().insert(
            address.to_string(),
            AccountEquity {
                account_value,
                withdrawable: account_value,
                ..Default::default()
            },
        );
    }

    pub fn set_positions(&self, address: &str, positions: Vec<Position>) {
        self.positions
            .lock()
            .unwrap()
            .insert(address.to_string(), positions);
    }

    /// The next equity lookups fail with these errors, in order.
    pub fn fail_equity(&self, errors: Vec<GatewayError>) {
        self.equity_failures.lock().unwrap().extend(errors);
    }

    pub fn push_order_response(&self, response: Result<OrderResponse, GatewayError>) {
        self.order_responses.lock().unwrap().push_back(response);
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn account_equity(&self, address: &str) -> Result<AccountEquity, GatewayError> {
        if let Some(err) = self.equity_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.equities
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| GatewayError::Account(format!("unknown account {address}")))
    }

    async fn positions(&self, address: &str) -> Result<Vec<Position>, GatewayError> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_leverage(&self, coin: &str, leverage: u32) -> Result<(), GatewayError> {
        self.leverage_calls
            .lock()
            .unwrap()
            .push((coin.to_string(), leverage));
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        self.orders.lock().unwrap().push(order.clone());
        if let Some(scripted) = self.order_responses.lock().unwrap().pop_front() {
            return scripted;
        }
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderResponse {
            resting: Some(RestingOrder { order_id }),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Fill transport
// ---------------------------------------------------------------------------

/// What the next `connect` call does.
#[allow(dead_code)]
pub enum ConnectScript {
    Fail,
    /// Deliver these frames, then close (or stay open when `hold_open`).
    Frames { frames: Vec<String>, hold_open: bool },
}

/// Transport replaying scripted connections. Once the script runs out every
/// connect fails.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<ConnectScript>>,
    connects: AtomicU32,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(scripts: Vec<ConnectScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            connects: AtomicU32::new(0),
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[allow(dead_code)]
struct MockConnection {
    frames: VecDeque<String>,
    hold_open: bool,
}

#[async_trait]
impl FillConnection for MockConnection {
    async fn recv(&mut self) -> Option<String> {
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        self.frames.clear();
    }
}

#[async_trait]
impl FillTransport for MockTransport {
    async fn connect(&self, _address: &str) -> Result<Box<dyn FillConnection>, GatewayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.scripts.lock().unwrap().pop_front() {
            Some(ConnectScript::Frames { frames, hold_open }) => Ok(Box::new(MockConnection {
                frames: frames.into(),
                hold_open,
            })),
            Some(ConnectScript::Fail) | None => {
                Err(GatewayError::WebSocket("connection refused".into()))
            }
        }
    }

    fn decode(&self, raw: &str) -> Result<FillMessage, DecodeError> {
        decode_message(raw)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TradeCopied { coin: String, success: bool },
    Error(String),
    HealthCheck { drift_coins: usize },
    Startup,
    Shutdown(String),
}

#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Notification::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Notification) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn trade_copied(&self, _fill: &FillEvent, params: &CopyTradeParams, result: &TradeResult) {
        self.push(Notification::TradeCopied {
            coin: params.coin.clone(),
            success: result.success,
        });
    }

    async fn error(&self, message: &str, _context: &BTreeMap<String, String>) {
        self.push(Notification::Error(message.to_string()));
    }

    async fn health_check(&self, result: &HealthCheckResult) {
        self.push(Notification::HealthCheck {
            drift_coins: result.drift.len(),
        });
    }

    async fn startup(&self, _summary: &str) {
        self.push(Notification::Startup);
    }

    async fn shutdown(&self, reason: &str) {
        self.push(Notification::Shutdown(reason.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn fill(coin: &str, direction: Direction, size: Decimal, price: Decimal, start: Decimal) -> FillEvent {
    let side = match direction {
        Direction::OpenLong | Direction::CloseShort => Side::Buy,
        _ => Side::Sell,
    };
    FillEvent {
        coin: coin.to_string(),
        price,
        size,
        side,
        direction,
        start_position: start,
        timestamp: Utc::now(),
        hash: None,
        order_id: None,
        trade_id: None,
        closed_pnl: None,
        fee: None,
    }
}

#[allow(dead_code)]
pub fn position(coin: &str, size: Decimal, leverage: u32) -> Position {
    Position {
        coin: coin.to_string(),
        size,
        entry_price: None,
        leverage: Leverage {
            kind: LeverageKind::Cross,
            value: leverage,
        },
        liquidation_price: None,
        margin_used: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
        position_value: Decimal::ZERO,
    }
}

/// A `userFills` frame carrying one fill.
#[allow(dead_code)]
pub fn fill_frame(coin: &str, is_snapshot: bool) -> String {
    json!({
        "channel": "userFills",
        "data": {
            "isSnapshot": is_snapshot,
            "user": TARGET_ADDRESS,
            "fills": [{
                "coin": coin,
                "px": "2000.5",
                "sz": "1.5",
                "side": "B",
                "time": 1700000000000i64,
                "startPosition": "0",
                "dir": "Open Long",
                "closedPnl": "0",
                "hash": "0xabc",
                "oid": 1,
                "tid": 2,
                "fee": "0.1"
            }]
        }
    })
    .to_string()
}
