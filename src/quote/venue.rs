//! REST client for the quote venue

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::codec::{decode_wire, RawQuote, RawQuoteWire};
use crate::common::errors::{EngineError, Result};

/// Quote book as served by the venue
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteBookResponse {
    #[serde(default)]
    pub orders: Vec<serde_json::Value>,
}

/// Client for fetching pre-signed quotes
#[derive(Debug, Clone)]
pub struct VenueClient {
    client: Client,
    quotes_url: String,
}

impl VenueClient {
    /// Create a new venue client
    pub fn new(quotes_url: &str) -> Result<Self> {
        Self::with_timeout(quotes_url, Duration::from_secs(30))
    }

    /// Create a new venue client with custom timeout
    pub fn with_timeout(quotes_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            quotes_url: quotes_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the current quote book
    ///
    /// Every record is strictly decoded; records that fail are logged and
    /// excluded rather than patched up.
    #[instrument(skip(self))]
    pub async fn fetch_quotes(&self) -> Result<Vec<RawQuote>> {
        debug!("Fetching quotes from: {}", self.quotes_url);

        let response = self
            .client
            .get(&self.quotes_url)
            .send()
            .await
            .map_err(|e| EngineError::Network(format!("quote venue unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::InvalidResponse(format!(
                "Quote venue returned status {}: {}",
                status, body
            )));
        }

        let book: QuoteBookResponse = response.json().await?;
        Ok(decode_book(book))
    }
}

/// Decode every record of a quote book, dropping the invalid ones
pub fn decode_book(book: QuoteBookResponse) -> Vec<RawQuote> {
    let total = book.orders.len();
    let quotes: Vec<RawQuote> = book
        .orders
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let wire: RawQuoteWire = match serde_json::from_value(value) {
                Ok(wire) => wire,
                Err(e) => {
                    warn!(index, "Dropping malformed quote record: {}", e);
                    return None;
                }
            };
            match decode_wire(&wire) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!(index, maker = %wire.maker, "Dropping invalid quote record: {}", e);
                    None
                }
            }
        })
        .collect();

    debug!("Decoded {} of {} quote records", quotes.len(), total);
    quotes
}
