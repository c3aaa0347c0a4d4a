//! Time-horizon buckets for quotes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::codec::ParsedQuote;

/// Below this many hours a quote is too close to expiry to trade
pub const MIN_TRADEABLE_HOURS: Decimal = dec!(2);

/// Named time-to-expiry range
///
/// | Bucket | Hours to expiry |
/// |--------|-----------------|
/// | Blitz  | [2, 9]          |
/// | Rush   | (9, 18]         |
/// | Core   | (18, 36]        |
/// | Orbit  | (36, ∞)         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DurationBucket {
    Blitz,
    Rush,
    Core,
    Orbit,
}

impl DurationBucket {
    pub const ALL: [DurationBucket; 4] = [
        DurationBucket::Blitz,
        DurationBucket::Rush,
        DurationBucket::Core,
        DurationBucket::Orbit,
    ];

    /// Bucket for a time-to-expiry in hours, `None` when under two hours
    pub fn from_hours(hours: Decimal) -> Option<Self> {
        if hours < MIN_TRADEABLE_HOURS {
            None
        } else if hours <= dec!(9) {
            Some(DurationBucket::Blitz)
        } else if hours <= dec!(18) {
            Some(DurationBucket::Rush)
        } else if hours <= dec!(36) {
            Some(DurationBucket::Core)
        } else {
            Some(DurationBucket::Orbit)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DurationBucket::Blitz => "BLITZ",
            DurationBucket::Rush => "RUSH",
            DurationBucket::Core => "CORE",
            DurationBucket::Orbit => "ORBIT",
        }
    }
}

impl std::fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Classify a quote by its contract expiry relative to `now`
pub fn classify(quote: &ParsedQuote, now: DateTime<Utc>) -> Option<DurationBucket> {
    DurationBucket::from_hours(quote.hours_to_expiry(now))
}
