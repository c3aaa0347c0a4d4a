//! Trait definitions for the external collaborators the engine talks to

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use super::errors::{ChainError, Result};
use super::types::{Address, Asset, Candle, PriceSourceTag, U256};
use crate::quote::codec::RawQuote;

/// Arguments of the venue's fill call
#[derive(Debug, Clone, PartialEq)]
pub struct FillRequest {
    /// Quote as signed by the maker, with the computed contract count
    pub order: RawQuote,
    /// Contract amount at 1e6 scale, substituted into the struct at call time
    pub num_contracts: u128,
    pub signature: Vec<u8>,
    pub referrer: Address,
}

/// Inclusion result of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: TxStatus,
}

/// Chain access through the user's signer
///
/// The signer itself is opaque to the engine. Reads are re-entrant and may be
/// issued by anyone; writes are only issued by the one running state machine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TradeChain: Send + Sync {
    /// Address of the signing wallet
    fn owner(&self) -> Address;

    /// ERC-20 allowance in token base units
    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> std::result::Result<U256, ChainError>;

    /// ERC-20 balance in token base units
    async fn balance_of(&self, token: &Address, owner: &Address)
        -> std::result::Result<U256, ChainError>;

    /// Submit `approve(spender, amount)`, returning the transaction hash
    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: U256,
    ) -> std::result::Result<String, ChainError>;

    /// Submit the fill call against the option book contract
    async fn fill_order(
        &self,
        option_book: &Address,
        request: &FillRequest,
    ) -> std::result::Result<String, ChainError>;

    /// Wait for on-chain inclusion of a submitted transaction
    async fn wait_for_receipt(&self, tx_hash: &str) -> std::result::Result<TxReceipt, ChainError>;
}

/// One layer of the authoritative price cascade
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Tag recorded on samples from this source
    fn tag(&self) -> PriceSourceTag;

    /// Current price of `asset` in quote currency
    async fn latest_price(&self, asset: Asset) -> Result<Decimal>;
}

/// Candle history feeding the chart
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Most recent candles, oldest first
    async fn candles(&self, asset: Asset) -> Result<Vec<Candle>>;
}

/// Payload sent to the sync endpoint after a successful fill
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillNotice {
    pub tx_hash: String,
    pub taker: Address,
    pub maker: Address,
    pub asset: Asset,
    pub num_contracts: String,
}

/// Post-success side channel
#[async_trait]
pub trait SyncNotifier: Send + Sync {
    async fn notify_fill(&self, notice: &FillNotice) -> Result<()>;
}
