//! QuoteEngine Library
//!
//! Prices, selects, sizes and executes signed option quotes, and keeps an
//! authoritative underlying price through an ordered fallback of sources.

pub mod common;
pub mod config;
pub mod execution;
pub mod price;
pub mod quote;

// Re-export commonly used types
pub use common::errors::{DecodeError, EngineError, Result};
pub use common::traits::{CandleSource, PriceSource, SyncNotifier, TradeChain};
pub use common::types::{
    Address, Asset, BetDirection, Candle, FeedTable, OptionKind, PriceSample, PriceSourceTag,
    StructureKind, TxPhase, U256,
};
pub use config::types::AppConfig;

// Quote pipeline
pub use quote::{
    best_by_bucket, best_quote, calculate_payout, classify, DurationBucket, ParsedQuote, Payout,
    PositionSizer, QuoteSelector, RawQuote, Selection, SelectionCriteria, SizedQuote, VenueClient,
};

// Execution and prices
pub use execution::{
    ExecutionSettings, ExecutionStateMachine, Phase, SessionObserver, TransactionSession,
};
pub use price::{ChartFeed, Connectivity, PriceCascade, PriceEvent, PriceMonitor, PriceReading};
