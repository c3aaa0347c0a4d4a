//! Error types for the engine

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::TxPhase;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad user input (zero spend, expired quote, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet balance below the amount being spent
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Spend above what the quote's collateral allows
    #[error("Spend {requested} exceeds collateral limit, maximum spend is {max_spend}")]
    ExceedsCollateralLimit { requested: Decimal, max_spend: Decimal },

    /// Any price or quote source unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Signer declined the transaction
    #[error("Transaction rejected during {phase}: {reason}")]
    TransactionRejected { phase: TxPhase, reason: String },

    /// Transaction was included but failed on-chain
    #[error("Transaction reverted during {phase}: {tx_hash}")]
    TransactionReverted { phase: TxPhase, tx_hash: String },

    /// Price feed has no entry in the feed table
    #[error("Unknown asset for price feed {0}")]
    UnknownAsset(String),

    /// Selector ran and found nothing matching
    #[error("No quote available")]
    NoQuoteAvailable,

    /// Quote record failed strict schema validation
    #[error("Quote decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Structure the calculation layer does not price
    #[error("Unsupported structure: {0}")]
    UnsupportedStructure(String),

    /// Another transaction session is already running
    #[error("A transaction session is already in flight")]
    SessionInFlight,

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the price cascade should fall through to the next source
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_)
                | EngineError::HttpRequest(_)
                | EngineError::JsonParse(_)
                | EngineError::InvalidResponse(_)
        )
    }

    /// Phase a transaction error belongs to, if any
    pub fn phase(&self) -> Option<TxPhase> {
        match self {
            EngineError::TransactionRejected { phase, .. }
            | EngineError::TransactionReverted { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Strict wire-schema failures for quote records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid hex in {field}")]
    InvalidHex { field: &'static str },

    #[error("invalid integer in {field}: {value}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("expected 1 to 3 strikes, got {0}")]
    StrikeCount(usize),

    #[error("strikes must be strictly increasing")]
    StrikesNotIncreasing,

    #[error("price must be greater than zero")]
    ZeroPrice,

    #[error("{field} is out of range")]
    OutOfRange { field: &'static str },
}

/// Failures reported by the signer/provider seam
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Signer declined to sign or send
    #[error("rejected by signer: {0}")]
    Rejected(String),

    /// Provider/RPC could not be reached or answered badly
    #[error("provider error: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_trigger_fallback() {
        assert!(EngineError::Network("timeout".into()).is_network());
        assert!(EngineError::InvalidResponse("500".into()).is_network());
        assert!(!EngineError::UnknownAsset("0xabc".into()).is_network());
        assert!(!EngineError::NoQuoteAvailable.is_network());
    }

    #[test]
    fn test_transaction_errors_carry_phase() {
        let err = EngineError::TransactionRejected {
            phase: TxPhase::Approval,
            reason: "user denied".into(),
        };
        assert_eq!(err.phase(), Some(TxPhase::Approval));
        assert_eq!(EngineError::Validation("zero".into()).phase(), None);
    }
}
