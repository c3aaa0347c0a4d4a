//! Position sizing from a fiat spend amount
//!
//! All arithmetic runs on the wire's fixed-point integers: spend in collateral
//! base units (1e6), premium and strikes at 1e8, contract counts at 1e6.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::codec::{to_fixed, ParsedQuote};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{
    Address, StructureKind, COLLATERAL_DECIMALS, COLLATERAL_UNIT, CONTRACT_DECIMALS, CONTRACT_UNIT,
    PRICE_DECIMALS, PRICE_UNIT,
};

/// Why the collateral ceiling was not evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CeilingGap {
    /// Only single-strike quotes have a defined ceiling
    MultiLeg,
    /// Collateral token is not the canonical one
    AlternateCollateral,
}

/// Result of the collateral ceiling check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CeilingCheck {
    Within { max_spend: Decimal },
    NotDefined(CeilingGap),
}

/// A quote plus the contract count derived from the user's spend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizedQuote {
    pub quote: ParsedQuote,
    /// Spend truncated to collateral precision
    pub spend: Decimal,
    /// Spend in collateral base units
    pub spend_units: u128,
    /// Contract amount at 1e6 scale
    pub num_contracts: u128,
    pub ceiling: CeilingCheck,
    pub computed_at: DateTime<Utc>,
}

impl SizedQuote {
    /// Contract count in whole contracts
    pub fn contracts(&self) -> Result<Decimal> {
        units_to_decimal(self.num_contracts, CONTRACT_DECIMALS)
    }
}

/// Fixed-point units to a normalized decimal
///
/// Fails when the value does not fit the 96-bit decimal mantissa.
pub fn units_to_decimal(units: u128, decimals: u32) -> Result<Decimal> {
    i128::try_from(units)
        .ok()
        .and_then(|u| Decimal::try_from_i128_with_scale(u, decimals).ok())
        .map(|d| d.normalize())
        .ok_or_else(|| EngineError::Validation(format!("{} units exceed decimal range", units)))
}

/// Decimal spend to collateral base units, dropping sub-unit dust
pub fn spend_to_units(spend: Decimal) -> Result<u128> {
    if spend <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "spend amount must be greater than zero".to_string(),
        ));
    }
    spend
        .checked_mul(Decimal::from(COLLATERAL_UNIT as u64))
        .map(|scaled| scaled.floor())
        .and_then(|scaled| scaled.to_u128())
        .ok_or_else(|| EngineError::Validation("spend amount is too large".to_string()))
}

/// `floor(spend / premium * 1e6)` on fixed-point inputs
pub fn num_contracts(spend_units: u128, premium_units: u128) -> Option<u128> {
    if premium_units == 0 {
        return None;
    }
    let divisor = premium_units.checked_mul(COLLATERAL_UNIT)?;
    spend_units
        .checked_mul(CONTRACT_UNIT)?
        .checked_mul(PRICE_UNIT)
        .map(|n| n / divisor)
}

fn premium_units(quote: &ParsedQuote) -> Result<u128> {
    to_fixed("premium", quote.premium, PRICE_DECIMALS)
        .map_err(|e| EngineError::Validation(format!("premium not representable: {}", e)))
}

/// Sizes positions against a canonical collateral token
#[derive(Debug, Clone)]
pub struct PositionSizer {
    canonical_collateral: Address,
}

impl PositionSizer {
    pub fn new(canonical_collateral: Address) -> Self {
        Self {
            canonical_collateral,
        }
    }

    pub fn canonical_collateral(&self) -> &Address {
        &self.canonical_collateral
    }

    /// Largest spend the quote's collateral can back
    ///
    /// `maxContracts = maxCollateral / strike`, `maxSpend = maxContracts * premium`.
    /// Defined only for single-strike quotes in the canonical collateral.
    pub fn collateral_ceiling(&self, quote: &ParsedQuote) -> Result<CeilingCheck> {
        if quote.structure != StructureKind::Vanilla {
            return Ok(CeilingCheck::NotDefined(CeilingGap::MultiLeg));
        }
        if quote.collateral != self.canonical_collateral {
            return Ok(CeilingCheck::NotDefined(CeilingGap::AlternateCollateral));
        }

        let strike = quote
            .strikes
            .first()
            .copied()
            .ok_or_else(|| EngineError::Internal("vanilla quote without a strike".to_string()))?;
        let strike_units = to_fixed("strike", strike, PRICE_DECIMALS)?;
        if strike_units == 0 {
            return Err(EngineError::Validation("strike must be positive".to_string()));
        }
        let collateral_units =
            to_fixed("maxCollateral", quote.max_collateral, COLLATERAL_DECIMALS)?;

        let max_spend_units = collateral_units
            .checked_mul(premium_units(quote)?)
            .map(|n| n / strike_units)
            .ok_or_else(|| EngineError::Internal("collateral ceiling overflow".to_string()))?;

        Ok(CeilingCheck::Within {
            max_spend: units_to_decimal(max_spend_units, COLLATERAL_DECIMALS)?,
        })
    }

    /// Convert a spend amount into a contract count
    pub fn size(&self, quote: &ParsedQuote, spend: Decimal) -> Result<SizedQuote> {
        let spend_units = spend_to_units(spend)?;
        let premium = premium_units(quote)?;
        if premium == 0 {
            return Err(EngineError::Validation("premium must be positive".to_string()));
        }

        let ceiling = self.collateral_ceiling(quote)?;
        let spend = units_to_decimal(spend_units, COLLATERAL_DECIMALS)?;
        if let CeilingCheck::Within { max_spend } = ceiling {
            if spend > max_spend {
                return Err(EngineError::ExceedsCollateralLimit {
                    requested: spend,
                    max_spend,
                });
            }
        }

        let contracts = num_contracts(spend_units, premium)
            .ok_or_else(|| EngineError::Validation("spend amount is too large".to_string()))?;
        if contracts == 0 {
            return Err(EngineError::Validation(
                "spend amount is too small to buy any contracts".to_string(),
            ));
        }

        debug!(
            quote = %quote.id(),
            %spend,
            num_contracts = contracts,
            ceiling = ?ceiling,
            "Sized quote"
        );

        Ok(SizedQuote {
            quote: quote.clone(),
            spend,
            spend_units,
            num_contracts: contracts,
            ceiling,
            computed_at: Utc::now(),
        })
    }
}
