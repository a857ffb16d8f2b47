use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{bail, Context};
use rust_decimal::Decimal;

use crate::execution::risk_engine::RiskLimits;
use crate::hyperliquid::{MAINNET_API_URL, MAINNET_WS_URL, TESTNET_API_URL, TESTNET_WS_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => bail!("unknown network {other:?} (expected mainnet or testnet)"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    // Accounts
    pub target_address: String,
    pub private_key: Option<String>,
    pub our_address: Option<String>,
    pub vault_address: Option<String>,

    // Exchange endpoints
    pub network: Network,
    pub api_url: String,
    pub ws_url: String,

    // Risk
    pub size_multiplier: Decimal,
    pub max_leverage: u32,
    pub max_position_size_pct: Decimal,
    pub min_notional: Decimal,
    pub max_concurrent_trades: usize,
    pub blocked_assets: Vec<String>,

    // Execution
    pub dry_run: bool,
    pub market_slippage_pct: Decimal,
    pub fill_queue_capacity: usize,
    pub ws_max_reconnect_attempts: u32,

    // Health check
    pub health_check_interval_secs: u64,
    pub drift_threshold: Decimal,

    // Telegram notifications (optional)
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key → value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let network: Network = parse_or(&get, "HYPERLIQUID_NETWORK", Network::Mainnet)?;
        let (default_api, default_ws) = match network {
            Network::Mainnet => (MAINNET_API_URL, MAINNET_WS_URL),
            Network::Testnet => (TESTNET_API_URL, TESTNET_WS_URL),
        };

        let blocked_assets = get("BLOCKED_ASSETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PORT", 8080)?,

            target_address: get("TARGET_ADDRESS").context("TARGET_ADDRESS must be set")?,
            private_key: get("PRIVATE_KEY"),
            our_address: get("OUR_ADDRESS"),
            vault_address: get("VAULT_ADDRESS"),

            network,
            api_url: get("HYPERLIQUID_API_URL").unwrap_or_else(|| default_api.into()),
            ws_url: get("HYPERLIQUID_WS_URL").unwrap_or_else(|| default_ws.into()),

            size_multiplier: parse_or(&get, "SIZE_MULTIPLIER", Decimal::ONE)?,
            max_leverage: parse_or(&get, "MAX_LEVERAGE", 10)?,
            max_position_size_pct: parse_or(&get, "MAX_POSITION_SIZE_PERCENT", Decimal::from(50))?,
            min_notional: parse_or(&get, "MIN_NOTIONAL", Decimal::from(10))?,
            max_concurrent_trades: parse_or(&get, "MAX_CONCURRENT_TRADES", 5)?,
            blocked_assets,

            dry_run: parse_or(&get, "DRY_RUN", false)?,
            market_slippage_pct: parse_or(&get, "MARKET_SLIPPAGE_PCT", Decimal::from(5))?,
            fill_queue_capacity: parse_or(&get, "FILL_QUEUE_CAPACITY", 256)?,
            ws_max_reconnect_attempts: parse_or(&get, "WS_MAX_RECONNECT_ATTEMPTS", 10)?,

            health_check_interval_secs: parse_or(&get, "HEALTH_CHECK_INTERVAL_SECS", 300)?,
            drift_threshold: parse_or(&get, "DRIFT_THRESHOLD", Decimal::new(1, 2))?,

            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
        })
    }

    /// Reject out-of-range knobs and unusable account settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_address("TARGET_ADDRESS", &self.target_address)?;
        if let Some(addr) = &self.our_address {
            parse_address("OUR_ADDRESS", addr)?;
        }
        if let Some(addr) = &self.vault_address {
            parse_address("VAULT_ADDRESS", addr)?;
        }
        if self.private_key.is_none() && self.our_address.is_none() {
            bail!("OUR_ADDRESS must be set when PRIVATE_KEY is absent");
        }

        if self.size_multiplier <= Decimal::ZERO {
            bail!("SIZE_MULTIPLIER must be positive, got {}", self.size_multiplier);
        }
        if self.max_leverage == 0 {
            bail!("MAX_LEVERAGE must be at least 1");
        }
        if self.max_position_size_pct <= Decimal::ZERO || self.max_position_size_pct > Decimal::ONE_HUNDRED {
            bail!(
                "MAX_POSITION_SIZE_PERCENT must be in (0, 100], got {}",
                self.max_position_size_pct
            );
        }
        if self.min_notional < Decimal::ZERO {
            bail!("MIN_NOTIONAL must not be negative");
        }
        if self.max_concurrent_trades == 0 {
            bail!("MAX_CONCURRENT_TRADES must be at least 1");
        }
        if self.market_slippage_pct < Decimal::ZERO || self.market_slippage_pct >= Decimal::ONE_HUNDRED {
            bail!("MARKET_SLIPPAGE_PCT must be in [0, 100), got {}", self.market_slippage_pct);
        }
        if self.fill_queue_capacity == 0 {
            bail!("FILL_QUEUE_CAPACITY must be at least 1");
        }
        if self.health_check_interval_secs == 0 {
            bail!("HEALTH_CHECK_INTERVAL_SECS must be at least 1");
        }
        if self.drift_threshold < Decimal::ZERO {
            bail!("DRIFT_THRESHOLD must not be negative");
        }
        Ok(())
    }

    /// Without a key we can only watch, never trade.
    pub fn effective_dry_run(&self) -> bool {
        self.dry_run || self.private_key.is_none()
    }

    pub fn is_mainnet(&self) -> bool {
        self.network == Network::Mainnet
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            size_multiplier: self.size_multiplier,
            max_leverage: self.max_leverage,
            max_position_size_pct: self.max_position_size_pct,
            min_notional: self.min_notional,
            max_concurrent_trades: self.max_concurrent_trades,
            blocked_assets: self.blocked_assets.clone(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("target_address", &self.target_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("our_address", &self.our_address)
            .field("vault_address", &self.vault_address)
            .field("network", &self.network)
            .field("api_url", &self.api_url)
            .field("ws_url", &self.ws_url)
            .field("size_multiplier", &self.size_multiplier)
            .field("max_leverage", &self.max_leverage)
            .field("max_position_size_pct", &self.max_position_size_pct)
            .field("min_notional", &self.min_notional)
            .field("max_concurrent_trades", &self.max_concurrent_trades)
            .field("blocked_assets", &self.blocked_assets)
            .field("dry_run", &self.dry_run)
            .field("market_slippage_pct", &self.market_slippage_pct)
            .field("fill_queue_capacity", &self.fill_queue_capacity)
            .field("ws_max_reconnect_attempts", &self.ws_max_reconnect_attempts)
            .field("health_check_interval_secs", &self.health_check_interval_secs)
            .field("drift_threshold", &self.drift_threshold)
            .field("telegram_bot_token", &self.telegram_bot_token.as_ref().map(|_| "<redacted>"))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}")),
    }
}

fn parse_address(key: &str, value: &str) -> anyhow::Result<Address> {
    Address::from_str(value).map_err(|e| anyhow::anyhow!("invalid {key} {value:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const TARGET: &str = "0x1111111111111111111111111111111111111111";
    const OURS: &str = "0x2222222222222222222222222222222222222222";

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("TARGET_ADDRESS", TARGET), ("OUR_ADDRESS", OURS)]).unwrap();
        assert_eq!(cfg.size_multiplier, dec!(1));
        assert_eq!(cfg.max_leverage, 10);
        assert_eq!(cfg.max_position_size_pct, dec!(50));
        assert_eq!(cfg.min_notional, dec!(10));
        assert_eq!(cfg.max_concurrent_trades, 5);
        assert_eq!(cfg.drift_threshold, dec!(0.01));
        assert_eq!(cfg.health_check_interval_secs, 300);
        assert_eq!(cfg.ws_url, MAINNET_WS_URL);
        assert!(cfg.effective_dry_run());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_testnet_and_blocked_assets() {
        let cfg = config(&[
            ("TARGET_ADDRESS", TARGET),
            ("OUR_ADDRESS", OURS),
            ("HYPERLIQUID_NETWORK", "Testnet"),
            ("BLOCKED_ASSETS", " doge, ,PEPE "),
        ])
        .unwrap();
        assert_eq!(cfg.api_url, TESTNET_API_URL);
        assert_eq!(cfg.blocked_assets, vec!["DOGE".to_string(), "PEPE".to_string()]);
        assert!(cfg.risk_limits().is_blocked("doge"));
    }

    #[test]
    fn test_missing_target_is_error() {
        assert!(config(&[("OUR_ADDRESS", OURS)]).is_err());
    }

    #[test]
    fn test_malformed_number_is_error() {
        let err = config(&[("TARGET_ADDRESS", TARGET), ("MAX_LEVERAGE", "ten")]).unwrap_err();
        assert!(err.to_string().contains("MAX_LEVERAGE"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let base = [("TARGET_ADDRESS", TARGET), ("OUR_ADDRESS", OURS)];
        for (key, value) in [
            ("MAX_POSITION_SIZE_PERCENT", "150"),
            ("SIZE_MULTIPLIER", "0"),
            ("MAX_CONCURRENT_TRADES", "0"),
            ("MARKET_SLIPPAGE_PCT", "100"),
        ] {
            let mut vars = base.to_vec();
            vars.push((key, value));
            assert!(config(&vars).unwrap().validate().is_err(), "{key}={value}");
        }
    }

    #[test]
    fn test_validate_requires_address_without_key() {
        let cfg = config(&[("TARGET_ADDRESS", TARGET)]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = config(&[
            ("TARGET_ADDRESS", TARGET),
            ("PRIVATE_KEY", "0xsupersecret"),
            ("TELEGRAM_BOT_TOKEN", "bot-token"),
        ])
        .unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("bot-token"));
        assert!(!cfg.effective_dry_run());
    }
}
