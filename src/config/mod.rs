//! Config module - typed configuration and layered loader

pub mod loader;
pub mod types;

pub use loader::{load_config, load_from_env};
pub use types::{AppConfig, AppSettings, ChainConfig, FeedEntry, PriceConfig, VenueConfig};
