//! Quote record codec
//!
//! The venue publishes pre-signed quotes as fixed-point integers: strikes and
//! premium at 1e8, maximum collateral at 1e6 (the canonical collateral token
//! has 6 decimals). [`decode_wire`] validates the JSON record strictly and
//! [`parse`] turns it into human-scaled values. [`encode`] is the inverse used
//! when the quote goes back on-chain.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::errors::{DecodeError, EngineError, Result};
use crate::common::types::{
    parse_address, Address, Asset, FeedTable, OptionKind, StructureKind, COLLATERAL_DECIMALS,
    PRICE_DECIMALS,
};

/// Quote exactly as signed by the maker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    pub maker: Address,
    pub collateral: Address,
    pub is_call: bool,
    pub price_feed: Address,
    /// 1e8 fixed-point, strictly increasing
    pub strikes: Vec<u128>,
    /// Contract expiry, unix seconds
    pub expiry: i64,
    /// Signing expiry of the quote itself, unix seconds
    pub order_expiry: i64,
    /// 1e6 fixed-point
    pub max_collateral_usable: u128,
    /// Premium per contract, 1e8 fixed-point
    pub price: u128,
    pub signature: Vec<u8>,
    pub extra_data: Vec<u8>,
}

impl RawQuote {
    /// Check the record invariants
    pub fn validate(&self) -> std::result::Result<(), DecodeError> {
        if self.strikes.is_empty() || self.strikes.len() > 3 {
            return Err(DecodeError::StrikeCount(self.strikes.len()));
        }
        if self.strikes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DecodeError::StrikesNotIncreasing);
        }
        if self.price == 0 {
            return Err(DecodeError::ZeroPrice);
        }
        Ok(())
    }
}

/// Big integers arrive either as decimal strings or plain JSON numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireInt {
    Text(String),
    Number(u64),
}

impl WireInt {
    fn to_u128(&self, field: &'static str) -> std::result::Result<u128, DecodeError> {
        match self {
            WireInt::Number(n) => Ok(u128::from(*n)),
            WireInt::Text(s) => s.trim().parse().map_err(|_| DecodeError::InvalidInteger {
                field,
                value: s.clone(),
            }),
        }
    }

    fn to_i64(&self, field: &'static str) -> std::result::Result<i64, DecodeError> {
        i64::try_from(self.to_u128(field)?).map_err(|_| DecodeError::OutOfRange { field })
    }
}

impl From<u128> for WireInt {
    fn from(value: u128) -> Self {
        WireInt::Text(value.to_string())
    }
}

/// JSON shape of a quote record published by the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuoteWire {
    pub maker: String,
    pub collateral: String,
    pub is_call: bool,
    pub price_feed: String,
    pub strikes: Vec<WireInt>,
    pub expiry: WireInt,
    pub order_expiry_timestamp: WireInt,
    pub max_collateral_usable: WireInt,
    pub price: WireInt,
    pub signature: String,
    #[serde(default)]
    pub extra_data: Option<String>,
}

fn decode_hex(field: &'static str, value: &str) -> std::result::Result<Vec<u8>, DecodeError> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(body).map_err(|_| DecodeError::InvalidHex { field })
}

/// Strictly validate a wire record before any numeric use
pub fn decode_wire(wire: &RawQuoteWire) -> std::result::Result<RawQuote, DecodeError> {
    let strikes = wire
        .strikes
        .iter()
        .map(|s| s.to_u128("strikes"))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let raw = RawQuote {
        maker: parse_address("maker", &wire.maker)?,
        collateral: parse_address("collateral", &wire.collateral)?,
        is_call: wire.is_call,
        price_feed: parse_address("priceFeed", &wire.price_feed)?,
        strikes,
        expiry: wire.expiry.to_i64("expiry")?,
        order_expiry: wire.order_expiry_timestamp.to_i64("orderExpiryTimestamp")?,
        max_collateral_usable: wire.max_collateral_usable.to_u128("maxCollateralUsable")?,
        price: wire.price.to_u128("price")?,
        signature: decode_hex("signature", &wire.signature)?,
        extra_data: match &wire.extra_data {
            Some(data) => decode_hex("extraData", data)?,
            None => Vec::new(),
        },
    };
    raw.validate()?;
    Ok(raw)
}

/// Back to the wire JSON shape
pub fn to_wire(raw: &RawQuote) -> RawQuoteWire {
    RawQuoteWire {
        maker: format!("{:?}", raw.maker),
        collateral: format!("{:?}", raw.collateral),
        is_call: raw.is_call,
        price_feed: format!("{:?}", raw.price_feed),
        strikes: raw.strikes.iter().map(|s| WireInt::from(*s)).collect(),
        expiry: WireInt::Text(raw.expiry.to_string()),
        order_expiry_timestamp: WireInt::Text(raw.order_expiry.to_string()),
        max_collateral_usable: WireInt::from(raw.max_collateral_usable),
        price: WireInt::from(raw.price),
        signature: format!("0x{}", hex::encode(&raw.signature)),
        extra_data: Some(format!("0x{}", hex::encode(&raw.extra_data))),
    }
}

/// Quote in display/calculation scale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuote {
    pub asset: Asset,
    pub kind: OptionKind,
    pub structure: StructureKind,
    pub strikes: Vec<Decimal>,
    /// Premium per contract
    pub premium: Decimal,
    pub expiry: DateTime<Utc>,
    pub signing_expiry: DateTime<Utc>,
    pub max_collateral: Decimal,
    pub maker: Address,
    pub collateral: Address,
    pub price_feed: Address,
    #[serde(skip)]
    pub signature: Vec<u8>,
    #[serde(skip)]
    pub extra_data: Vec<u8>,
}

impl ParsedQuote {
    /// Both the signing expiry and the contract expiry are still ahead
    pub fn is_tradeable(&self, now: DateTime<Utc>) -> bool {
        self.signing_expiry > now && self.expiry > now
    }

    /// Hours until contract expiry, full precision
    pub fn hours_to_expiry(&self, now: DateTime<Utc>) -> Decimal {
        let seconds = (self.expiry - now).num_seconds();
        Decimal::from(seconds) / Decimal::from(3600)
    }

    /// Strikes formatted for display
    pub fn strike_label(&self) -> String {
        format_strikes(&self.strikes)
    }

    /// Stable identity of a quote across refreshes
    pub fn id(&self) -> String {
        format!("0x{}", hex::encode(&self.signature))
    }
}

fn from_fixed(
    field: &'static str,
    raw: u128,
    decimals: u32,
) -> std::result::Result<Decimal, DecodeError> {
    let mantissa = i128::try_from(raw).map_err(|_| DecodeError::OutOfRange { field })?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map(|d| d.normalize())
        .map_err(|_| DecodeError::OutOfRange { field })
}

/// Exact inverse of the scale conversion used by [`parse`]
pub fn to_fixed(
    field: &'static str,
    value: Decimal,
    decimals: u32,
) -> std::result::Result<u128, DecodeError> {
    if value.is_sign_negative() {
        return Err(DecodeError::OutOfRange { field });
    }
    let scale = Decimal::from(10u64.pow(decimals));
    value
        .checked_mul(scale)
        .filter(|scaled| scaled.fract().is_zero())
        .and_then(|scaled| scaled.to_u128())
        .ok_or(DecodeError::OutOfRange { field })
}

fn timestamp(field: &'static str, secs: i64) -> std::result::Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(DecodeError::OutOfRange { field })
}

/// Decode fixed-point values and resolve the asset from the price feed
pub fn parse(raw: &RawQuote, feeds: &FeedTable) -> Result<ParsedQuote> {
    raw.validate()?;

    let asset = feeds.asset_for(&raw.price_feed)?;
    let structure = StructureKind::from_leg_count(raw.strikes.len())
        .ok_or(DecodeError::StrikeCount(raw.strikes.len()))?;
    let strikes = raw
        .strikes
        .iter()
        .map(|s| from_fixed("strikes", *s, PRICE_DECIMALS))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ParsedQuote {
        asset,
        kind: if raw.is_call {
            OptionKind::Call
        } else {
            OptionKind::Put
        },
        structure,
        strikes,
        premium: from_fixed("price", raw.price, PRICE_DECIMALS)?,
        expiry: timestamp("expiry", raw.expiry)?,
        signing_expiry: timestamp("orderExpiryTimestamp", raw.order_expiry)?,
        max_collateral: from_fixed(
            "maxCollateralUsable",
            raw.max_collateral_usable,
            COLLATERAL_DECIMALS,
        )?,
        maker: raw.maker,
        collateral: raw.collateral,
        price_feed: raw.price_feed,
        signature: raw.signature.clone(),
        extra_data: raw.extra_data.clone(),
    })
}

/// Restore the wire scale of a parsed quote
pub fn encode(quote: &ParsedQuote) -> Result<RawQuote> {
    let strikes = quote
        .strikes
        .iter()
        .map(|s| to_fixed("strikes", *s, PRICE_DECIMALS))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let raw = RawQuote {
        maker: quote.maker,
        collateral: quote.collateral,
        is_call: quote.kind == OptionKind::Call,
        price_feed: quote.price_feed,
        strikes,
        expiry: quote.expiry.timestamp(),
        order_expiry: quote.signing_expiry.timestamp(),
        max_collateral_usable: to_fixed(
            "maxCollateralUsable",
            quote.max_collateral,
            COLLATERAL_DECIMALS,
        )?,
        price: to_fixed("price", quote.premium, PRICE_DECIMALS)?,
        signature: quote.signature.clone(),
        extra_data: quote.extra_data.clone(),
    };
    raw.validate()?;
    Ok(raw)
}

/// Parse a batch, excluding quotes that cannot be priced
///
/// Quotes whose feed is missing from the table are dropped, never guessed.
pub fn parse_all(raws: &[RawQuote], feeds: &FeedTable) -> Vec<ParsedQuote> {
    raws.iter()
        .filter_map(|raw| match parse(raw, feeds) {
            Ok(quote) => Some(quote),
            Err(EngineError::UnknownAsset(feed)) => {
                warn!(
                    feed = %feed,
                    maker = ?raw.maker,
                    "Excluding quote with unmapped price feed"
                );
                None
            }
            Err(e) => {
                warn!(maker = ?raw.maker, "Excluding unparseable quote: {}", e);
                None
            }
        })
        .collect()
}

/// "A", "A / B" or "A / B / C"
pub fn format_strikes(strikes: &[Decimal]) -> String {
    match strikes {
        [] => String::new(),
        [single] => single.normalize().to_string(),
        [low, high] => format!("{} / {}", low.normalize(), high.normalize()),
        [low, mid, high] => format!(
            "{} / {} / {}",
            low.normalize(),
            mid.normalize(),
            high.normalize()
        ),
        many => many
            .iter()
            .map(|s| s.normalize().to_string())
            .collect::<Vec<_>>()
            .join(" / "),
    }
}
