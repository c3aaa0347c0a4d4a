//! Price module - authoritative price cascade and chart history

pub mod cascade;
pub mod history;
pub mod monitor;
pub mod sources;

pub use cascade::{Connectivity, PriceCascade, PriceReading};
pub use history::{ChartFeed, PriceHistory};
pub use monitor::{event_channel, MonitorSettings, PriceEvent, PriceMonitor};
pub use sources::{
    DecimalsCache, ExchangeCandleSource, ExchangeTickerSource, OnchainAggregatorSource,
    ProxyPriceSource,
};
