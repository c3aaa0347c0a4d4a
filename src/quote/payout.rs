//! Max payout and ROI for vanilla and spread structures
//!
//! Long calls have no payout ceiling. That case is carried as
//! [`Bounded::Unbounded`] all the way to the display boundary instead of an
//! infinite float.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use super::codec::ParsedQuote;
use crate::common::errors::{EngineError, Result};
use crate::common::types::{OptionKind, StructureKind};

/// A value that may have no upper bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Bounded {
    Bounded(Decimal),
    Unbounded,
}

impl Bounded {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Bounded::Bounded(v) => Some(*v),
            Bounded::Unbounded => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Bounded::Unbounded)
    }
}

/// Economics of one contract of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Payout {
    /// Max payout per contract, net of premium
    pub max_payout: Bounded,
    /// Percent, full precision
    pub roi: Bounded,
}

impl Payout {
    /// ROI rounded to a whole percent, e.g. `"400%"` or `"∞"`
    pub fn roi_label(&self) -> String {
        match self.roi {
            Bounded::Bounded(roi) => format!(
                "{}%",
                roi.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            ),
            Bounded::Unbounded => "∞".to_string(),
        }
    }

    pub fn payout_label(&self) -> String {
        match self.max_payout {
            Bounded::Bounded(payout) => payout.round_dp(2).normalize().to_string(),
            Bounded::Unbounded => "Unlimited".to_string(),
        }
    }
}

fn roi(payout: Decimal, premium: Decimal) -> Result<Decimal> {
    if premium <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "premium must be positive to compute ROI".to_string(),
        ));
    }
    payout
        .checked_div(premium)
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .ok_or_else(|| EngineError::Internal("ROI overflow".to_string()))
}

/// Max payout and ROI per contract
///
/// Butterflies are not priced here and return `UnsupportedStructure`.
pub fn calculate(quote: &ParsedQuote) -> Result<Payout> {
    match (quote.structure, quote.kind) {
        (StructureKind::Vanilla, OptionKind::Call) => Ok(Payout {
            max_payout: Bounded::Unbounded,
            roi: Bounded::Unbounded,
        }),
        (StructureKind::Vanilla, OptionKind::Put) => {
            let strike = quote.strikes.first().copied().ok_or_else(|| {
                EngineError::Internal("vanilla quote without a strike".to_string())
            })?;
            let payout = strike - quote.premium;
            Ok(Payout {
                max_payout: Bounded::Bounded(payout),
                roi: Bounded::Bounded(roi(payout, quote.premium)?),
            })
        }
        (StructureKind::Spread, _) => match quote.strikes.as_slice() {
            [low, high] => {
                let width = (*high - *low).abs();
                let payout = width - quote.premium;
                Ok(Payout {
                    max_payout: Bounded::Bounded(payout),
                    roi: Bounded::Bounded(roi(payout, quote.premium)?),
                })
            }
            _ => Err(EngineError::Internal(
                "spread quote without two strikes".to_string(),
            )),
        },
        (StructureKind::Butterfly, _) => Err(EngineError::UnsupportedStructure(
            "butterfly payout".to_string(),
        )),
    }
}
