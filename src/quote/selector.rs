//! Best-quote selection per asset, direction and duration bucket

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::codec::ParsedQuote;
use super::duration::{classify, DurationBucket};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{Asset, BetDirection};

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub asset: Asset,
    pub direction: BetDirection,
    pub bucket: DurationBucket,
}

impl SelectionCriteria {
    pub fn new(asset: Asset, direction: BetDirection, bucket: DurationBucket) -> Self {
        Self {
            asset,
            direction,
            bucket,
        }
    }

    /// Whether `quote` is tradeable and matches asset, option kind and bucket
    pub fn matches(&self, quote: &ParsedQuote, now: DateTime<Utc>) -> bool {
        quote.asset == self.asset
            && quote.kind == self.direction.option_kind()
            && quote.is_tradeable(now)
            && classify(quote, now) == Some(self.bucket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Automatic,
    Manual,
}

/// Outcome of the selector
///
/// `NotRun` and `NoQuoteAvailable` are distinct so callers can tell an empty
/// result from one that was never computed.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    NotRun,
    NoQuoteAvailable,
    Selected {
        quote: ParsedQuote,
        mode: SelectionMode,
    },
}

impl Selection {
    pub fn quote(&self) -> Option<&ParsedQuote> {
        match self {
            Selection::Selected { quote, .. } => Some(quote),
            _ => None,
        }
    }
}

/// Cheapest matching quote; ties keep the first one seen
pub fn best_quote<'a>(
    quotes: &'a [ParsedQuote],
    criteria: &SelectionCriteria,
    now: DateTime<Utc>,
) -> Option<&'a ParsedQuote> {
    quotes
        .iter()
        .filter(|q| criteria.matches(q, now))
        // min_by returns the first of several equal minima
        .min_by(|a, b| a.premium.cmp(&b.premium))
}

/// Cheapest quote in every bucket that has one
pub fn best_by_bucket<'a>(
    quotes: &'a [ParsedQuote],
    asset: Asset,
    direction: BetDirection,
    now: DateTime<Utc>,
) -> BTreeMap<DurationBucket, &'a ParsedQuote> {
    DurationBucket::ALL
        .iter()
        .filter_map(|bucket| {
            let criteria = SelectionCriteria::new(asset, direction, *bucket);
            best_quote(quotes, &criteria, now).map(|q| (*bucket, q))
        })
        .collect()
}

/// Stateful selector holding an optional manual override
///
/// A manual pick wins over automatic selection until it is cleared, the bet
/// direction changes, or its signing expiry passes. Changing the duration
/// bucket alone keeps the override.
#[derive(Debug)]
pub struct QuoteSelector {
    direction: Option<BetDirection>,
    manual: Option<ParsedQuote>,
    last: Selection,
}

impl QuoteSelector {
    pub fn new() -> Self {
        Self {
            direction: None,
            manual: None,
            last: Selection::NotRun,
        }
    }

    /// Pin a user-chosen quote
    pub fn set_manual(&mut self, quote: ParsedQuote) {
        info!(quote = %quote.id(), strikes = %quote.strike_label(), "Manual quote override set");
        self.manual = Some(quote);
    }

    pub fn clear_manual(&mut self) {
        if self.manual.take().is_some() {
            info!("Manual quote override cleared");
        }
    }

    pub fn has_manual(&self) -> bool {
        self.manual.is_some()
    }

    /// Run selection against the current quote set
    pub fn select(
        &mut self,
        quotes: &[ParsedQuote],
        criteria: &SelectionCriteria,
        now: DateTime<Utc>,
    ) -> &Selection {
        if self.direction != Some(criteria.direction) {
            if self.direction.is_some() {
                self.clear_manual();
            }
            self.direction = Some(criteria.direction);
        }

        let manual_expired = self
            .manual
            .as_ref()
            .map_or(false, |manual| !manual.is_tradeable(now));
        if manual_expired {
            debug!("Manual quote passed its signing expiry");
            self.clear_manual();
        }

        self.last = match &self.manual {
            Some(manual) => Selection::Selected {
                quote: manual.clone(),
                mode: SelectionMode::Manual,
            },
            None => match best_quote(quotes, criteria, now) {
                Some(best) => Selection::Selected {
                    quote: best.clone(),
                    mode: SelectionMode::Automatic,
                },
                None => Selection::NoQuoteAvailable,
            },
        };
        &self.last
    }

    /// Result of the last `select` call
    pub fn selection(&self) -> &Selection {
        &self.last
    }

    /// Selected quote, or the reason there is none
    pub fn require(&self) -> Result<&ParsedQuote> {
        match &self.last {
            Selection::Selected { quote, .. } => Ok(quote),
            Selection::NoQuoteAvailable => Err(EngineError::NoQuoteAvailable),
            Selection::NotRun => Err(EngineError::Internal(
                "quote selector has not run".to_string(),
            )),
        }
    }
}

impl Default for QuoteSelector {
    fn default() -> Self {
        Self::new()
    }
}
