//! Configuration types

use ethers::types::H160;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::TradeChain;
use crate::common::types::{Address, Asset, FeedTable};
use crate::execution::machine::{ExecutionSettings, ExecutionStateMachine};
use crate::execution::sync::HttpSyncNotifier;
use crate::price::monitor::MonitorSettings;
use crate::quote::sizer::PositionSizer;

/// USDC on Base, 6 decimals
const BASE_USDC: Address = H160([
    0x83, 0x35, 0x89, 0xfc, 0xd6, 0xed, 0xb6, 0xe0, 0x8f, 0x4c, 0x7c, 0x32, 0xd4, 0xf7, 0x1b, 0x54,
    0xbd, 0xa0, 0x29, 0x13,
]);
/// ETH/USD aggregator on Base
const ETH_USD_FEED: Address = H160([
    0x71, 0x04, 0x1d, 0xdd, 0xad, 0x35, 0x95, 0xf9, 0xce, 0xd3, 0xdc, 0xcf, 0xbe, 0x3d, 0x1f, 0x4b,
    0x0a, 0x16, 0xbb, 0x70,
]);
/// BTC/USD aggregator on Base
const BTC_USD_FEED: Address = H160([
    0x64, 0xc9, 0x11, 0x99, 0x6d, 0x3c, 0x6a, 0xc7, 0x1f, 0x9b, 0x45, 0x5b, 0x1e, 0x8e, 0x72, 0x66,
    0xbc, 0xbd, 0x84, 0x8f,
]);

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Quote venue endpoints
    #[serde(default)]
    pub venue: VenueConfig,
    /// Chain access and contract addresses
    #[serde(default)]
    pub chain: ChainConfig,
    /// Price sources and polling cadence
    #[serde(default)]
    pub price: PriceConfig,
    /// Static feed -> asset table
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedEntry>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            chain: ChainConfig::default(),
            price: PriceConfig::default(),
            feeds: default_feeds(),
            settings: AppSettings::default(),
        }
    }
}

impl AppConfig {
    /// Feed table built from `feeds`, rejecting an asset listed twice
    pub fn feed_table(&self) -> Result<FeedTable> {
        FeedTable::new(self.feeds.iter().map(|f| (f.address, f.asset)))
    }

    /// Sizer against the configured canonical collateral token
    pub fn position_sizer(&self) -> PositionSizer {
        PositionSizer::new(self.chain.collateral_token)
    }

    /// Notifier posting fill notices to `venue.sync_url`
    pub fn sync_notifier(&self) -> Result<HttpSyncNotifier> {
        HttpSyncNotifier::new(&self.venue.sync_url)
    }

    /// State machine over the user's signer, wired with the sync notifier
    pub fn execution_machine(
        &self,
        chain: Arc<dyn TradeChain>,
    ) -> Result<Arc<ExecutionStateMachine>> {
        let machine = ExecutionStateMachine::new(chain, self.chain.execution_settings()?)
            .with_notifier(Arc::new(self.sync_notifier()?));
        Ok(Arc::new(machine))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_seconds)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.price.poll_interval_seconds.max(1)),
            history_interval: Duration::from_secs(self.price.history_interval_seconds.max(1)),
        }
    }
}

/// Quote venue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Order book endpoint returning `{"orders": [...]}`
    #[serde(default = "default_quotes_url")]
    pub quotes_url: String,
    /// Endpoint notified after a successful fill
    #[serde(default = "default_sync_url")]
    pub sync_url: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            quotes_url: default_quotes_url(),
            sync_url: default_sync_url(),
        }
    }
}

fn default_quotes_url() -> String {
    "http://localhost:8080/api/orders".to_string()
}

fn default_sync_url() -> String {
    "http://localhost:8080/api/sync".to_string()
}

/// Chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Settlement contract: approval spender and fill target
    #[serde(default)]
    pub option_book: Option<Address>,
    /// Canonical 6-decimal collateral token
    #[serde(default = "default_collateral_token")]
    pub collateral_token: Address,
    /// Referrer passed with every fill
    #[serde(default = "default_referrer")]
    pub referrer: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            option_book: None,
            collateral_token: default_collateral_token(),
            referrer: default_referrer(),
        }
    }
}

impl ChainConfig {
    /// Execution needs a settlement contract; price display does not
    pub fn execution_settings(&self) -> Result<ExecutionSettings> {
        let option_book = self.option_book.ok_or_else(|| {
            EngineError::Configuration("chain.option_book is not set".to_string())
        })?;
        Ok(ExecutionSettings {
            option_book,
            referrer: self.referrer,
        })
    }
}

fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}

fn default_collateral_token() -> Address {
    BASE_USDC
}

fn default_referrer() -> Address {
    Address::zero()
}

/// Price source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Backend proxy returning prices keyed by symbol
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Exchange REST base URL for tickers and candles
    #[serde(default = "default_exchange_url")]
    pub exchange_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_history_interval")]
    pub history_interval_seconds: u64,
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,
    /// Samples retained per asset for charting
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            exchange_url: default_exchange_url(),
            poll_interval_seconds: default_poll_interval(),
            history_interval_seconds: default_history_interval(),
            candle_interval: default_candle_interval(),
            candle_limit: default_candle_limit(),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_proxy_url() -> String {
    "http://localhost:8080/api/prices".to_string()
}

fn default_exchange_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_history_interval() -> u64 {
    60
}

fn default_candle_interval() -> String {
    "1m".to_string()
}

fn default_candle_limit() -> u32 {
    60
}

fn default_history_capacity() -> usize {
    120
}

/// One row of the feed -> asset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub address: Address,
    pub asset: Asset,
}

fn default_feeds() -> Vec<FeedEntry> {
    vec![
        FeedEntry {
            address: ETH_USD_FEED,
            asset: Asset::Eth,
        },
        FeedEntry {
            address: BTC_USD_FEED,
            asset: Asset::Btc,
        },
    ]
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
