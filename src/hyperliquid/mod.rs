//! Hyperliquid adapter: REST info/exchange clients, L1 signing and the
//! WebSocket fill transport.

pub mod exchange_client;
pub mod gateway;
pub mod info_client;
pub mod signing;
pub mod types;
pub mod ws;

pub use exchange_client::ExchangeClient;
pub use gateway::HyperliquidGateway;
pub use info_client::InfoClient;
pub use signing::ActionSigner;
pub use ws::HyperliquidFillTransport;

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";
pub const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
pub const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";
