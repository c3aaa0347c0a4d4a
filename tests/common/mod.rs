//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use quote_engine::common::errors::ChainError;
use quote_engine::common::traits::{FillRequest, TradeChain, TxReceipt, TxStatus};
use quote_engine::common::types::{Address, Asset, FeedTable, U256};
use quote_engine::quote::codec::{decode_wire, parse, ParsedQuote, RawQuoteWire};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const ETH_FEED: &str = "0x71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70";
pub const BTC_FEED: &str = "0x64c911996D3c6aC71f9b455B1E8E7266BcbD848F";
pub const UNMAPPED_FEED: &str = "0x00000000000000000000000000000000000000ff";
pub const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
pub const MAKER: &str = "0x1111111111111111111111111111111111111111";
pub const TAKER: &str = "0x2222222222222222222222222222222222222222";
pub const OPTION_BOOK: &str = "0x3333333333333333333333333333333333333333";
pub const REFERRER: &str = "0x4444444444444444444444444444444444444444";

pub fn address(value: &str) -> Address {
    value.parse().expect("valid test address")
}

pub fn feed_table() -> FeedTable {
    FeedTable::new([(address(ETH_FEED), Asset::Eth), (address(BTC_FEED), Asset::Btc)])
        .expect("distinct feeds")
}

/// Wire record as the venue publishes it
///
/// `strikes` and `price` are already at 1e8 scale; the quote expires
/// `hours` from now and its signature stays valid for one more hour.
pub fn quote_json(feed: &str, is_call: bool, strikes: &[u128], price: u128, hours: i64) -> Value {
    let now = Utc::now();
    json!({
        "maker": MAKER,
        "collateral": USDC,
        "isCall": is_call,
        "priceFeed": feed,
        "strikes": strikes.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "expiry": (now + Duration::hours(hours)).timestamp().to_string(),
        "orderExpiryTimestamp": (now + Duration::hours(1)).timestamp(),
        "maxCollateralUsable": "30000000000",
        "price": price.to_string(),
        "signature": format!("0x{}", "ab".repeat(65)),
        "extraData": "0x"
    })
}

/// ETH put struck at 3000 with a 25 premium
pub fn eth_put_json(hours: i64) -> Value {
    quote_json(ETH_FEED, false, &[300_000_000_000], 2_500_000_000, hours)
}

pub fn parsed(value: Value) -> ParsedQuote {
    let wire: RawQuoteWire = serde_json::from_value(value).expect("wire record");
    let raw = decode_wire(&wire).expect("valid wire record");
    parse(&raw, &feed_table()).expect("mapped feed")
}

/// Scripted chain double
///
/// Counts each call and can hold the fill submission until released so
/// tests can observe an in-flight session.
pub struct FakeChain {
    pub owner: Address,
    pub allowance: Mutex<U256>,
    pub balance: U256,
    pub reject_approve: bool,
    pub revert_fill: bool,
    pub fill_gate: Option<Arc<Notify>>,
    pub approvals: AtomicU32,
    pub fills: AtomicU32,
    pub last_fill: Mutex<Option<FillRequest>>,
}

impl FakeChain {
    pub fn new(allowance: impl Into<U256>, balance: impl Into<U256>) -> Self {
        Self {
            owner: address(TAKER),
            allowance: Mutex::new(allowance.into()),
            balance: balance.into(),
            reject_approve: false,
            revert_fill: false,
            fill_gate: None,
            approvals: AtomicU32::new(0),
            fills: AtomicU32::new(0),
            last_fill: Mutex::new(None),
        }
    }

    pub fn approvals(&self) -> u32 {
        self.approvals.load(Ordering::SeqCst)
    }

    pub fn fills(&self) -> u32 {
        self.fills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeChain for FakeChain {
    fn owner(&self) -> Address {
        self.owner
    }

    async fn allowance(
        &self,
        _token: &Address,
        _owner: &Address,
        _spender: &Address,
    ) -> Result<U256, ChainError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn balance_of(&self, _token: &Address, _owner: &Address) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn approve(
        &self,
        _token: &Address,
        _spender: &Address,
        amount: U256,
    ) -> Result<String, ChainError> {
        self.approvals.fetch_add(1, Ordering::SeqCst);
        if self.reject_approve {
            return Err(ChainError::Rejected("user denied".to_string()));
        }
        *self.allowance.lock().unwrap() = amount;
        Ok("0xapprove".to_string())
    }

    async fn fill_order(
        &self,
        _option_book: &Address,
        request: &FillRequest,
    ) -> Result<String, ChainError> {
        if let Some(gate) = &self.fill_gate {
            gate.notified().await;
        }
        self.fills.fetch_add(1, Ordering::SeqCst);
        *self.last_fill.lock().unwrap() = Some(request.clone());
        Ok("0xfill".to_string())
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, ChainError> {
        let status = if tx_hash == "0xfill" && self.revert_fill {
            TxStatus::Reverted
        } else {
            TxStatus::Success
        };
        Ok(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: 1,
            status,
        })
    }
}

/// Sample exchange candle rows, oldest first
pub fn kline_rows(closes: &[&str]) -> Value {
    let base_ms: i64 = 1_704_067_200_000;
    Value::Array(
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                json!([
                    base_ms + (i as i64) * 60_000,
                    "3500.00",
                    "3510.00",
                    "3490.00",
                    close,
                    "12.5",
                    base_ms + (i as i64) * 60_000 + 59_999,
                    "43750.0",
                    100,
                    "6.0",
                    "21000.0",
                    "0"
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eth_put_fixture_parses() {
        let quote = parsed(eth_put_json(12));
        assert_eq!(quote.asset, Asset::Eth);
        assert_eq!(quote.strikes.len(), 1);
    }
}
