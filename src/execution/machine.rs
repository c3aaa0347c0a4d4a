//! Allowance → approve → fill state machine
//!
//! A buy is a strictly sequential chain of awaited chain calls. The approve
//! phase is skipped entirely when the current allowance already covers the
//! spend. Retrying means running a fresh session, which starts over from the
//! allowance check; the re-read is idempotent.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::session::{
    Phase, SessionFailure, SessionObserver, SessionSlot, SlotGuard, TransactionSession,
};
use super::sync;
use crate::common::errors::{ChainError, EngineError, Result};
use crate::common::traits::{FillNotice, FillRequest, SyncNotifier, TradeChain, TxStatus};
use crate::common::types::{Address, TxPhase, COLLATERAL_DECIMALS, U256};
use crate::quote::codec::encode;
use crate::quote::sizer::{units_to_decimal, CeilingCheck, SizedQuote};

type StepResult<T> = std::result::Result<T, (Option<TxPhase>, EngineError)>;

/// Static addresses the machine needs
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Approve spender and fill target
    pub option_book: Address,
    pub referrer: Address,
}

fn chain_error(phase: TxPhase, err: ChainError) -> (Option<TxPhase>, EngineError) {
    let error = match err {
        ChainError::Rejected(reason) => EngineError::TransactionRejected { phase, reason },
        ChainError::Provider(message) => EngineError::Network(message),
    };
    (Some(phase), error)
}

/// Drives one transaction session at a time against the user's signer
pub struct ExecutionStateMachine {
    chain: Arc<dyn TradeChain>,
    notifier: Option<Arc<dyn SyncNotifier>>,
    settings: ExecutionSettings,
    slot: SessionSlot,
    next_id: AtomicU64,
}

impl ExecutionStateMachine {
    pub fn new(chain: Arc<dyn TradeChain>, settings: ExecutionSettings) -> Self {
        Self {
            chain,
            notifier: None,
            settings,
            slot: SessionSlot::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach the post-success sync notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn SyncNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Whether a session is currently running
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    fn open_session(&self) -> Result<(SlotGuard, watch::Sender<TransactionSession>)> {
        let guard = self.slot.try_acquire()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, _rx) = watch::channel(TransactionSession::new(id));
        Ok((guard, tx))
    }

    /// Run a buy to completion
    ///
    /// Only `SessionInFlight` is returned as an `Err`; every other failure
    /// ends up in the returned session's `error`. The chain calls run on a
    /// background task, so dropping this future leaves the session running
    /// and the slot held until it finishes.
    pub async fn run(self: &Arc<Self>, sized: &SizedQuote) -> Result<TransactionSession> {
        let mut observer = self.spawn(sized.clone())?;
        Ok(observer.wait_terminal().await)
    }

    /// Run a buy in the background and hand back an observer
    pub fn spawn(self: &Arc<Self>, sized: SizedQuote) -> Result<SessionObserver> {
        let (guard, updates) = self.open_session()?;
        let observer = SessionObserver::new(updates.subscribe());
        let machine = Arc::clone(self);
        tokio::spawn(async move {
            let terminal = machine.drive(&sized, &updates).await;
            // The slot is free by the time anyone sees the terminal phase
            drop(guard);
            updates.send_replace(terminal);
        });
        Ok(observer)
    }

    /// Same as [`run`](Self::run); a retry always creates a new session
    pub async fn retry(self: &Arc<Self>, sized: &SizedQuote) -> Result<TransactionSession> {
        info!(quote = %sized.quote.id(), "Retrying buy from allowance check");
        self.run(sized).await
    }

    /// Step the session to `Success` or `Error`, leaving the terminal state unpublished
    #[instrument(skip_all, fields(quote = %sized.quote.id(), spend = %sized.spend))]
    async fn drive(
        &self,
        sized: &SizedQuote,
        updates: &watch::Sender<TransactionSession>,
    ) -> TransactionSession {
        let mut session = updates.borrow().clone();

        match self.execute(sized, &mut session, updates).await {
            Ok(()) => {
                info!(
                    session = session.id,
                    from = %session.phase,
                    to = %Phase::Success,
                    "Session transition"
                );
                session.enter(Phase::Success);
                info!(fill_tx = ?session.fill_tx, "Buy filled");
                self.notify(sized, &session);
            }
            Err((phase, err)) => {
                error!(phase = ?phase, "Buy failed: {}", err);
                session.fail(SessionFailure::from_error(phase, &err));
            }
        }
        session
    }

    fn advance(
        &self,
        session: &mut TransactionSession,
        phase: Phase,
        updates: &watch::Sender<TransactionSession>,
    ) {
        info!(session = session.id, from = %session.phase, to = %phase, "Session transition");
        session.enter(phase);
        updates.send_replace(session.clone());
    }

    /// Local checks, plus a balance read, before anything is submitted
    async fn preflight(&self, sized: &SizedQuote, owner: &Address) -> StepResult<()> {
        if sized.spend_units == 0 || sized.num_contracts == 0 {
            return Err((None, EngineError::Validation("spend must be positive".to_string())));
        }
        if !sized.quote.is_tradeable(Utc::now()) {
            return Err((None, EngineError::Validation("quote has expired".to_string())));
        }
        if let CeilingCheck::Within { max_spend } = sized.ceiling {
            if sized.spend > max_spend {
                return Err((
                    None,
                    EngineError::ExceedsCollateralLimit {
                        requested: sized.spend,
                        max_spend,
                    },
                ));
            }
        }

        let balance = self
            .chain
            .balance_of(&sized.quote.collateral, owner)
            .await
            .map_err(|e| (None, EngineError::Network(e.to_string())))?;
        if balance < U256::from(sized.spend_units) {
            // Below a u128 spend, so always convertible
            let available = u128::try_from(balance)
                .map_err(|_| EngineError::Internal(format!("balance {} out of range", balance)))
                .and_then(|units| units_to_decimal(units, COLLATERAL_DECIMALS))
                .map_err(|e| (None, e))?;
            return Err((
                None,
                EngineError::InsufficientBalance {
                    required: sized.spend,
                    available,
                },
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        sized: &SizedQuote,
        session: &mut TransactionSession,
        updates: &watch::Sender<TransactionSession>,
    ) -> StepResult<()> {
        let owner = self.chain.owner();
        let token = &sized.quote.collateral;
        let spender = &self.settings.option_book;
        let required = U256::from(sized.spend_units);

        self.preflight(sized, &owner).await?;

        self.advance(session, Phase::CheckingAllowance, updates);
        let allowance = self
            .chain
            .allowance(token, &owner, spender)
            .await
            .map_err(|e| chain_error(TxPhase::Approval, e))?;
        session.allowance = Some(allowance);

        if allowance < required {
            self.advance(session, Phase::Approving, updates);
            let approve_tx = self
                .chain
                .approve(token, spender, required)
                .await
                .map_err(|e| chain_error(TxPhase::Approval, e))?;
            session.approve_tx = Some(approve_tx.clone());

            self.advance(session, Phase::AwaitingApproval, updates);
            let receipt = self
                .chain
                .wait_for_receipt(&approve_tx)
                .await
                .map_err(|e| chain_error(TxPhase::Approval, e))?;
            if receipt.status == TxStatus::Reverted {
                return Err((
                    Some(TxPhase::Approval),
                    EngineError::TransactionReverted {
                        phase: TxPhase::Approval,
                        tx_hash: approve_tx,
                    },
                ));
            }

            // Confirm on-chain instead of trusting the receipt
            let refreshed = self
                .chain
                .allowance(token, &owner, spender)
                .await
                .map_err(|e| chain_error(TxPhase::Approval, e))?;
            session.allowance = Some(refreshed);
            if refreshed < required {
                warn!(
                    allowance = %refreshed,
                    required = %required,
                    "Allowance still short after approval"
                );
                return Err((
                    Some(TxPhase::Approval),
                    EngineError::TransactionReverted {
                        phase: TxPhase::Approval,
                        tx_hash: approve_tx,
                    },
                ));
            }
        }

        self.advance(session, Phase::Filling, updates);
        let request = self.fill_request(sized).map_err(|e| (Some(TxPhase::Fill), e))?;
        let fill_tx = self
            .chain
            .fill_order(spender, &request)
            .await
            .map_err(|e| chain_error(TxPhase::Fill, e))?;
        session.fill_tx = Some(fill_tx.clone());

        self.advance(session, Phase::AwaitingFill, updates);
        let receipt = self
            .chain
            .wait_for_receipt(&fill_tx)
            .await
            .map_err(|e| chain_error(TxPhase::Fill, e))?;
        if receipt.status == TxStatus::Reverted {
            return Err((
                Some(TxPhase::Fill),
                EngineError::TransactionReverted {
                    phase: TxPhase::Fill,
                    tx_hash: fill_tx,
                },
            ));
        }
        Ok(())
    }

    /// Quote struct plus the computed contract count, signature and referrer
    pub fn fill_request(&self, sized: &SizedQuote) -> Result<FillRequest> {
        Ok(FillRequest {
            order: encode(&sized.quote)?,
            num_contracts: sized.num_contracts,
            signature: sized.quote.signature.clone(),
            referrer: self.settings.referrer,
        })
    }

    fn notify(&self, sized: &SizedQuote, session: &TransactionSession) {
        let (Some(notifier), Some(tx_hash)) = (&self.notifier, &session.fill_tx) else {
            return;
        };
        let notice = FillNotice {
            tx_hash: tx_hash.clone(),
            taker: self.chain.owner(),
            maker: sized.quote.maker,
            asset: sized.quote.asset,
            num_contracts: sized.num_contracts.to_string(),
        };
        sync::dispatch(Arc::clone(notifier), notice);
    }
}
