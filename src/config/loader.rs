//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::{AppConfig, FeedEntry};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{parse_address, Address, Asset};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__CHAIN__RPC_URL`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))
}

/// Load configuration from environment variables only
///
/// `QUOTE_ENGINE_FEEDS` takes `address=ASSET` pairs separated by commas.
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::default();

    if let Ok(url) = std::env::var("QUOTE_ENGINE_QUOTES_URL") {
        config.venue.quotes_url = url;
    }
    if let Ok(url) = std::env::var("QUOTE_ENGINE_SYNC_URL") {
        config.venue.sync_url = url;
    }
    if let Ok(url) = std::env::var("QUOTE_ENGINE_RPC_URL") {
        config.chain.rpc_url = url;
    }
    if let Ok(value) = std::env::var("QUOTE_ENGINE_OPTION_BOOK") {
        config.chain.option_book = Some(env_address("QUOTE_ENGINE_OPTION_BOOK", &value)?);
    }
    if let Ok(value) = std::env::var("QUOTE_ENGINE_COLLATERAL_TOKEN") {
        config.chain.collateral_token = env_address("QUOTE_ENGINE_COLLATERAL_TOKEN", &value)?;
    }
    if let Ok(value) = std::env::var("QUOTE_ENGINE_REFERRER") {
        config.chain.referrer = env_address("QUOTE_ENGINE_REFERRER", &value)?;
    }
    if let Ok(url) = std::env::var("QUOTE_ENGINE_PROXY_URL") {
        config.price.proxy_url = url;
    }
    if let Ok(url) = std::env::var("QUOTE_ENGINE_EXCHANGE_URL") {
        config.price.exchange_url = url;
    }
    if let Ok(value) = std::env::var("QUOTE_ENGINE_FEEDS") {
        config.feeds = parse_feeds(&value)?;
    }

    Ok(config)
}

fn env_address(name: &'static str, value: &str) -> Result<Address> {
    parse_address(name, value.trim()).map_err(|e| EngineError::Configuration(e.to_string()))
}

fn parse_feeds(value: &str) -> Result<Vec<FeedEntry>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (address, asset) = entry.split_once('=').ok_or_else(|| {
                EngineError::Configuration(format!("feed entry without '=': {}", entry))
            })?;
            let asset: Asset = asset
                .parse()
                .map_err(|e| EngineError::Configuration(format!("{}", e)))?;
            Ok(FeedEntry {
                address: env_address("QUOTE_ENGINE_FEEDS", address)?,
                asset,
            })
        })
        .collect()
}
