//! Price sources: on-chain aggregator, backend proxy and exchange REST

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ethers::contract::abigen;
use ethers::providers::{Http, Provider};
use ethers::types::I256;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{CandleSource, PriceSource};
use crate::common::types::{Address, Asset, Candle, FeedTable, PriceSourceTag};

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::Internal(e.to_string()))
}

async fn ensure_success(response: Response, source: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(EngineError::InvalidResponse(format!(
        "{} returned status {}: {}",
        source, status, body
    )))
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

/// Aggregator decimals, read once per feed address
///
/// Shared explicitly between sources instead of living in a global.
#[derive(Debug, Default)]
pub struct DecimalsCache {
    by_feed: RwLock<HashMap<Address, u32>>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, feed: &Address) -> Option<u32> {
        self.by_feed.read().await.get(feed).copied()
    }

    pub async fn insert(&self, feed: Address, decimals: u32) {
        self.by_feed.write().await.insert(feed, decimals);
    }

    pub async fn len(&self) -> usize {
        self.by_feed.read().await.len()
    }
}

abigen!(
    AggregatorV3,
    r#"[
        function decimals() external view returns (uint8)
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
    ]"#
);

/// Direct read of the asset's on-chain aggregator over JSON-RPC
pub struct OnchainAggregatorSource {
    provider: Arc<Provider<Http>>,
    feeds: FeedTable,
    decimals: Arc<DecimalsCache>,
}

impl OnchainAggregatorSource {
    pub fn new(
        rpc_url: &str,
        feeds: FeedTable,
        decimals: Arc<DecimalsCache>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| EngineError::Configuration(format!("bad rpc url {}: {}", rpc_url, e)))?;
        let transport = Http::new_with_client(url, http_client(timeout)?);
        Ok(Self {
            provider: Arc::new(Provider::new(transport)),
            feeds,
            decimals,
        })
    }

    fn aggregator(&self, feed: Address) -> AggregatorV3<Provider<Http>> {
        AggregatorV3::new(feed, Arc::clone(&self.provider))
    }

    async fn feed_decimals(&self, feed: Address) -> Result<u32> {
        if let Some(decimals) = self.decimals.get(&feed).await {
            return Ok(decimals);
        }
        let decimals = self
            .aggregator(feed)
            .decimals()
            .call()
            .await
            .map_err(|e| EngineError::Network(format!("decimals() call failed: {}", e)))?;
        let decimals = u32::from(decimals);
        debug!(feed = ?feed, decimals, "Cached aggregator decimals");
        self.decimals.insert(feed, decimals).await;
        Ok(decimals)
    }
}

/// Scale a raw aggregator answer into a price
///
/// Only positive answers that fit in `i128` are meaningful prices.
pub fn answer_to_price(answer: I256, decimals: u32) -> Result<Decimal> {
    if answer <= I256::zero() {
        return Err(EngineError::InvalidResponse(
            "aggregator answer is not positive".to_string(),
        ));
    }
    let value = i128::try_from(answer).map_err(|_| {
        EngineError::InvalidResponse("aggregator answer is out of range".to_string())
    })?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .map(|d| d.normalize())
        .map_err(|e| EngineError::InvalidResponse(format!("aggregator answer: {}", e)))
}

#[async_trait]
impl PriceSource for OnchainAggregatorSource {
    fn tag(&self) -> PriceSourceTag {
        PriceSourceTag::Onchain
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: Asset) -> Result<Decimal> {
        let feed = self
            .feeds
            .feed_for(asset)
            .copied()
            .ok_or_else(|| EngineError::Configuration(format!("no price feed for {}", asset)))?;
        let decimals = self.feed_decimals(feed).await?;
        let (_round_id, answer, _started_at, _updated_at, _answered_in_round) = self
            .aggregator(feed)
            .latest_round_data()
            .call()
            .await
            .map_err(|e| EngineError::Network(format!("latestRoundData() call failed: {}", e)))?;
        answer_to_price(answer, decimals)
    }
}

/// Backend proxy exposing the venue's own prices as `{ "ETH": 3500.1, ... }`
pub struct ProxyPriceSource {
    client: Client,
    url: String,
}

impl ProxyPriceSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl PriceSource for ProxyPriceSource {
    fn tag(&self) -> PriceSourceTag {
        PriceSourceTag::Proxy
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: Asset) -> Result<Decimal> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("price proxy unreachable: {}", e)))?;
        let response = ensure_success(response, "Price proxy").await?;
        let prices: HashMap<String, Value> = response.json().await?;

        prices
            .get(asset.symbol())
            .or_else(|| prices.get(&asset.symbol().to_lowercase()))
            .and_then(decimal_from_json)
            .ok_or_else(|| {
                EngineError::InvalidResponse(format!("price proxy has no price for {}", asset))
            })
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

fn exchange_url(base: &str, path: &str, params: &[(&str, String)]) -> Result<Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse_with_params(&joined, params)
        .map_err(|e| EngineError::Configuration(format!("bad exchange url {}: {}", joined, e)))
}

/// Exchange spot ticker, the last layer of the cascade
pub struct ExchangeTickerSource {
    client: Client,
    base_url: String,
}

impl ExchangeTickerSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl PriceSource for ExchangeTickerSource {
    fn tag(&self) -> PriceSourceTag {
        PriceSourceTag::Exchange
    }

    #[instrument(skip(self))]
    async fn latest_price(&self, asset: Asset) -> Result<Decimal> {
        let url = exchange_url(
            &self.base_url,
            "/api/v3/ticker/price",
            &[("symbol", asset.exchange_symbol())],
        )?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("exchange unreachable: {}", e)))?;
        let response = ensure_success(response, "Exchange ticker").await?;
        let ticker: TickerResponse = response.json().await?;
        Decimal::from_str(ticker.price.trim())
            .map_err(|e| EngineError::InvalidResponse(format!("Invalid ticker price: {}", e)))
    }
}

/// Exchange candles at a fixed interval and count
pub struct ExchangeCandleSource {
    client: Client,
    base_url: String,
    interval: String,
    limit: u32,
}

impl ExchangeCandleSource {
    pub fn new(base_url: &str, interval: &str, limit: u32, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
            interval: interval.to_string(),
            limit,
        })
    }
}

/// Decode one `[openTime, open, high, low, close, volume, ...]` row
pub fn parse_candle(row: &[Value]) -> Result<Candle> {
    let invalid = |what: &str| EngineError::InvalidResponse(format!("Invalid candle {}", what));
    if row.len() < 6 {
        return Err(invalid("row length"));
    }
    let open_ms = row[0].as_i64().ok_or_else(|| invalid("open time"))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| invalid("open time"))?;
    let field = |i: usize, name: &str| decimal_from_json(&row[i]).ok_or_else(|| invalid(name));

    Ok(Candle {
        open_time,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

#[async_trait]
impl CandleSource for ExchangeCandleSource {
    #[instrument(skip(self))]
    async fn candles(&self, asset: Asset) -> Result<Vec<Candle>> {
        let url = exchange_url(
            &self.base_url,
            "/api/v3/klines",
            &[
                ("symbol", asset.exchange_symbol()),
                ("interval", self.interval.clone()),
                ("limit", self.limit.to_string()),
            ],
        )?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("exchange unreachable: {}", e)))?;
        let response = ensure_success(response, "Exchange klines").await?;
        let rows: Vec<Vec<Value>> = response.json().await?;

        let mut candles = rows
            .iter()
            .map(|row| parse_candle(row))
            .collect::<Result<Vec<_>>>()?;
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }
}
