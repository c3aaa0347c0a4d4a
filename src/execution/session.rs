//! Transaction session state and the single in-flight session slot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::common::errors::{EngineError, Result};
use crate::common::types::{TxPhase, COLLATERAL_DECIMALS, U256};
use crate::quote::sizer::units_to_decimal;

/// Phase of a buy attempt
///
/// `Idle → CheckingAllowance → (Approving → AwaitingApproval →)?`
/// `Filling → AwaitingFill → Success | Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Idle,
    CheckingAllowance,
    Approving,
    AwaitingApproval,
    Filling,
    AwaitingFill,
    Success,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Success | Phase::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::CheckingAllowance => "checking_allowance",
            Phase::Approving => "approving",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::Filling => "filling",
            Phase::AwaitingFill => "awaiting_fill",
            Phase::Success => "success",
            Phase::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Category of a session failure, for the UI to explain what broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Validation,
    InsufficientBalance,
    ExceedsCollateralLimit,
    Network,
    Rejected,
    Reverted,
    Internal,
}

/// Terminal error of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionFailure {
    /// `None` for pre-flight failures that never touched the chain
    pub phase: Option<TxPhase>,
    pub kind: FailureKind,
    pub message: String,
}

impl SessionFailure {
    pub fn from_error(phase: Option<TxPhase>, error: &EngineError) -> Self {
        let kind = match error {
            EngineError::Validation(_)
            | EngineError::Decode(_)
            | EngineError::UnsupportedStructure(_) => FailureKind::Validation,
            EngineError::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            EngineError::ExceedsCollateralLimit { .. } => FailureKind::ExceedsCollateralLimit,
            EngineError::TransactionRejected { .. } => FailureKind::Rejected,
            EngineError::TransactionReverted { .. } => FailureKind::Reverted,
            e if e.is_network() => FailureKind::Network,
            _ => FailureKind::Internal,
        };
        Self {
            phase: error.phase().or(phase),
            kind,
            message: error.to_string(),
        }
    }
}

/// One user-initiated buy attempt
///
/// Created fresh per attempt and never reused; a retry gets a new session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSession {
    pub id: u64,
    pub phase: Phase,
    /// Every phase entered, in order
    pub history: Vec<Phase>,
    /// Latest allowance read, in collateral base units
    pub allowance: Option<U256>,
    pub approve_tx: Option<String>,
    pub fill_tx: Option<String>,
    pub error: Option<SessionFailure>,
    pub started_at: DateTime<Utc>,
}

impl TransactionSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            history: vec![Phase::Idle],
            allowance: None,
            approve_tx: None,
            fill_tx: None,
            error: None,
            started_at: Utc::now(),
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.history.push(phase);
    }

    pub(crate) fn fail(&mut self, failure: SessionFailure) {
        self.error = Some(failure);
        self.enter(Phase::Error);
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Allowance in whole collateral units, `None` when unread or beyond decimal range
    pub fn allowance_amount(&self) -> Option<Decimal> {
        let units = u128::try_from(self.allowance?).ok()?;
        units_to_decimal(units, COLLATERAL_DECIMALS).ok()
    }

    /// Whether the approve phase was entered at all
    pub fn approved(&self) -> bool {
        self.history.contains(&Phase::Approving)
    }
}

/// At most one session in flight
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    busy: Arc<AtomicBool>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, failing with `SessionInFlight` when taken
    pub fn try_acquire(&self) -> Result<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EngineError::SessionInFlight)?;
        Ok(SlotGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Releases the slot when dropped
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Read side of a running session
///
/// Dropping the observer only drops interest in the outcome; the chain calls
/// already issued keep running to completion.
#[derive(Debug, Clone)]
pub struct SessionObserver {
    updates: watch::Receiver<TransactionSession>,
}

impl SessionObserver {
    pub(crate) fn new(updates: watch::Receiver<TransactionSession>) -> Self {
        Self { updates }
    }

    pub fn current(&self) -> TransactionSession {
        self.updates.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.updates.borrow().phase
    }

    /// The UI may stop observing only in `Idle` or a terminal phase
    pub fn can_detach(&self) -> bool {
        let phase = self.phase();
        phase == Phase::Idle || phase.is_terminal()
    }

    /// Wait until the session reaches `Success` or `Error`
    pub async fn wait_terminal(&mut self) -> TransactionSession {
        loop {
            if self.updates.borrow_and_update().is_terminal() {
                return self.current();
            }
            if self.updates.changed().await.is_err() {
                // Sender gone: the last published value is final
                return self.current();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_allows_one_session() {
        let slot = SessionSlot::new();
        let guard = slot.try_acquire().unwrap();
        assert!(slot.is_busy());
        assert!(matches!(slot.try_acquire(), Err(EngineError::SessionInFlight)));
        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_ok());
    }

    #[test]
    fn test_failure_keeps_transaction_phase() {
        let err = EngineError::TransactionReverted {
            phase: TxPhase::Fill,
            tx_hash: "0xabc".into(),
        };
        let failure = SessionFailure::from_error(None, &err);
        assert_eq!(failure.phase, Some(TxPhase::Fill));
        assert_eq!(failure.kind, FailureKind::Reverted);

        let preflight = SessionFailure::from_error(None, &EngineError::Validation("zero".into()));
        assert_eq!(preflight.phase, None);
        assert_eq!(preflight.kind, FailureKind::Validation);
    }

    #[test]
    fn test_session_history() {
        let mut session = TransactionSession::new(1);
        session.enter(Phase::CheckingAllowance);
        session.fail(SessionFailure::from_error(
            Some(TxPhase::Approval),
            &EngineError::Network("rpc down".into()),
        ));
        assert_eq!(
            session.history,
            vec![Phase::Idle, Phase::CheckingAllowance, Phase::Error]
        );
        assert!(session.is_terminal());
        assert_eq!(session.error.unwrap().phase, Some(TxPhase::Approval));
    }

    #[test]
    fn test_allowance_amount() {
        let mut session = TransactionSession::new(2);
        assert_eq!(session.allowance_amount(), None);

        session.allowance = Some(U256::from(2_500_000u64));
        assert_eq!(session.allowance_amount(), Some(Decimal::new(25, 1)));

        session.allowance = Some(U256::MAX);
        assert_eq!(session.allowance_amount(), None);
    }

    #[tokio::test]
    async fn test_observer_detach_rules() {
        let (tx, rx) = watch::channel(TransactionSession::new(7));
        let mut observer = SessionObserver::new(rx);
        assert!(observer.can_detach());

        tx.send_modify(|s| s.enter(Phase::Filling));
        assert!(!observer.can_detach());

        tx.send_modify(|s| s.enter(Phase::Success));
        let done = observer.wait_terminal().await;
        assert_eq!(done.phase, Phase::Success);
        assert!(observer.can_detach());
    }
}
