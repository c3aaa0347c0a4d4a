//! Shared domain types used across the quote, execution and price modules

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::errors::{DecodeError, EngineError};

/// 20-byte account or contract address; `{:?}` renders the full lowercase hex
pub use ethers::types::{Address, U256};

/// Fixed-point scale of strikes and premiums on the wire
pub const PRICE_DECIMALS: u32 = 8;
/// Fixed-point scale of the canonical collateral token
pub const COLLATERAL_DECIMALS: u32 = 6;
/// Fixed-point scale of contract amounts in fill calls
pub const CONTRACT_DECIMALS: u32 = 6;

/// 10^8
pub const PRICE_UNIT: u128 = 100_000_000;
/// 10^6
pub const COLLATERAL_UNIT: u128 = 1_000_000;
/// 10^6
pub const CONTRACT_UNIT: u128 = 1_000_000;

/// `0x` followed by exactly 40 hex digits, any case
pub fn parse_address(field: &'static str, value: &str) -> Result<Address, DecodeError> {
    let invalid = || DecodeError::InvalidAddress {
        field,
        value: value.to_string(),
    };
    let body = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(invalid)?;
    if body.len() != 40 {
        return Err(invalid());
    }
    body.parse().map_err(|_| invalid())
}

/// Underlying asset supported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Eth,
    Btc,
    Sol,
}

impl Asset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Eth => "ETH",
            Asset::Btc => "BTC",
            Asset::Sol => "SOL",
        }
    }

    /// Spot pair on the exchange used for tickers and candles
    pub fn exchange_symbol(&self) -> String {
        format!("{}USDT", self.symbol())
    }
}

impl FromStr for Asset {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ETH" => Ok(Asset::Eth),
            "BTC" => Ok(Asset::Btc),
            "SOL" => Ok(Asset::Sol),
            other => Err(EngineError::Validation(format!("unsupported asset: {}", other))),
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Option type carried by the quote's call/put flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionKind::Call => write!(f, "CALL"),
            OptionKind::Put => write!(f, "PUT"),
        }
    }
}

/// Direction of the user's bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetDirection {
    Up,
    Down,
}

impl BetDirection {
    /// Calls for "up" bets, puts for "down" bets
    pub fn option_kind(&self) -> OptionKind {
        match self {
            BetDirection::Up => OptionKind::Call,
            BetDirection::Down => OptionKind::Put,
        }
    }
}

/// Structure implied by the number of strikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    Vanilla,
    Spread,
    Butterfly,
}

impl StructureKind {
    pub fn from_leg_count(legs: usize) -> Option<Self> {
        match legs {
            1 => Some(StructureKind::Vanilla),
            2 => Some(StructureKind::Spread),
            3 => Some(StructureKind::Butterfly),
            _ => None,
        }
    }
}

/// On-chain phase a transaction error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxPhase {
    Approval,
    Fill,
}

impl std::fmt::Display for TxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxPhase::Approval => write!(f, "approval"),
            TxPhase::Fill => write!(f, "fill"),
        }
    }
}

/// Where a price sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceTag {
    Onchain,
    Proxy,
    Exchange,
}

impl std::fmt::Display for PriceSourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSourceTag::Onchain => write!(f, "onchain"),
            PriceSourceTag::Proxy => write!(f, "proxy"),
            PriceSourceTag::Exchange => write!(f, "exchange"),
        }
    }
}

/// A single price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub source: PriceSourceTag,
}

impl PriceSample {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal, source: PriceSourceTag) -> Self {
        Self {
            timestamp,
            price,
            source,
        }
    }
}

/// One exchange candle, `[openTime, open, high, low, close, volume, ...]` on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Static mapping of on-chain aggregator addresses to assets
///
/// Each asset has exactly one feed, so the reverse lookup is unambiguous.
#[derive(Debug, Clone, Default)]
pub struct FeedTable {
    by_feed: HashMap<Address, Asset>,
    by_asset: HashMap<Asset, Address>,
}

impl FeedTable {
    /// Build the table, rejecting an asset or feed listed twice
    pub fn new(entries: impl IntoIterator<Item = (Address, Asset)>) -> Result<Self, EngineError> {
        let mut table = Self::default();
        for (feed, asset) in entries {
            if table.by_asset.contains_key(&asset) {
                return Err(EngineError::Configuration(format!(
                    "asset {} mapped to more than one feed",
                    asset
                )));
            }
            if table.by_feed.contains_key(&feed) {
                return Err(EngineError::Configuration(format!(
                    "feed {:?} listed more than once",
                    feed
                )));
            }
            table.by_feed.insert(feed, asset);
            table.by_asset.insert(asset, feed);
        }
        Ok(table)
    }

    /// Resolve the asset behind a feed, `UnknownAsset` when unmapped
    pub fn asset_for(&self, feed: &Address) -> Result<Asset, EngineError> {
        self.by_feed
            .get(feed)
            .copied()
            .ok_or_else(|| EngineError::UnknownAsset(format!("{:?}", feed)))
    }

    /// Aggregator address for an asset, used for the on-chain price read
    pub fn feed_for(&self, asset: Asset) -> Option<&Address> {
        self.by_asset.get(&asset)
    }

    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.by_asset.keys().copied().collect();
        assets.sort_by_key(|a| a.symbol());
        assets
    }

    pub fn len(&self) -> usize {
        self.by_feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_feed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "0x71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70";
    const OTHER_FEED: &str = "0x64c911996D3c6aC71f9b455B1E8E7266BcbD848F";

    #[test]
    fn test_address_renders_full_lowercase_hex() {
        let address: Address = FEED.parse().unwrap();
        assert_eq!(format!("{:?}", address), FEED.to_lowercase());
        assert_eq!(address.as_bytes()[0], 0x71);
    }

    #[test]
    fn test_parse_address_requires_prefix_and_length() {
        let unprefixed = &FEED[2..];
        assert!(parse_address("feed", unprefixed).is_err());
        assert!(parse_address("feed", "0x1234").is_err());
        assert!(parse_address("feed", "0xzz041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70").is_err());

        let upper = format!("0X{}", unprefixed);
        assert_eq!(parse_address("feed", &upper).unwrap(), FEED.parse::<Address>().unwrap());
    }

    #[test]
    fn test_feed_table_lookup() {
        let feed: Address = FEED.parse().unwrap();
        let table = FeedTable::new([(feed, Asset::Eth)]).unwrap();

        assert_eq!(table.asset_for(&feed).unwrap(), Asset::Eth);
        assert_eq!(table.feed_for(Asset::Eth), Some(&feed));
        assert!(table.feed_for(Asset::Btc).is_none());

        let other: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        match table.asset_for(&other) {
            Err(EngineError::UnknownAsset(feed)) => {
                assert_eq!(feed, "0x0000000000000000000000000000000000000001")
            }
            other => panic!("expected UnknownAsset, got {:?}", other),
        }
    }

    #[test]
    fn test_feed_table_rejects_asset_with_two_feeds() {
        let result = FeedTable::new([
            (FEED.parse().unwrap(), Asset::Eth),
            (OTHER_FEED.parse().unwrap(), Asset::Eth),
        ]);
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_feed_table_rejects_repeated_feed() {
        let feed: Address = FEED.parse().unwrap();
        let result = FeedTable::new([(feed, Asset::Eth), (feed, Asset::Btc)]);
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_feed_for_is_stable() {
        let eth: Address = FEED.parse().unwrap();
        let btc: Address = OTHER_FEED.parse().unwrap();
        for _ in 0..8 {
            let table = FeedTable::new([(eth, Asset::Eth), (btc, Asset::Btc)]).unwrap();
            assert_eq!(table.feed_for(Asset::Eth), Some(&eth));
            assert_eq!(table.assets(), vec![Asset::Btc, Asset::Eth]);
        }
    }

    #[test]
    fn test_direction_maps_to_option_kind() {
        assert_eq!(BetDirection::Up.option_kind(), OptionKind::Call);
        assert_eq!(BetDirection::Down.option_kind(), OptionKind::Put);
    }

    #[test]
    fn test_asset_parsing() {
        assert_eq!("eth".parse::<Asset>().unwrap(), Asset::Eth);
        assert_eq!(Asset::Btc.exchange_symbol(), "BTCUSDT");
        assert!("DOGE".parse::<Asset>().is_err());
    }
}
