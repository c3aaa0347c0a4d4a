//! End-to-end buy flow against a scripted chain
//!
//! Covers sizing into execution, the approval skip, post-fill sync through a
//! real HTTP notifier, and the single in-flight session rule, including a
//! caller that stops waiting mid-flight.

mod common;

use common::{address, eth_put_json, parsed, FakeChain, OPTION_BOOK, REFERRER, USDC};
use pretty_assertions::assert_eq;
use quote_engine::common::types::{TxPhase, U256};
use quote_engine::execution::session::FailureKind;
use quote_engine::execution::sync::HttpSyncNotifier;
use quote_engine::quote::sizer::{PositionSizer, SizedQuote};
use quote_engine::{AppConfig, EngineError, ExecutionSettings, ExecutionStateMachine, Phase};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 1000 USDC at 6 decimals
const BALANCE: u64 = 1_000_000_000;

fn settings() -> ExecutionSettings {
    ExecutionSettings {
        option_book: address(OPTION_BOOK),
        referrer: address(REFERRER),
    }
}

fn machine(chain: Arc<FakeChain>) -> Arc<ExecutionStateMachine> {
    Arc::new(ExecutionStateMachine::new(chain, settings()))
}

fn sized_put(spend: rust_decimal::Decimal) -> SizedQuote {
    let quote = parsed(eth_put_json(12));
    PositionSizer::new(address(USDC))
        .size(&quote, spend)
        .expect("sizable spend")
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[test_log::test(tokio::test)]
async fn test_buy_with_approval() {
    let chain = Arc::new(FakeChain::new(0u64, BALANCE));
    let machine = machine(chain.clone());

    let sized = sized_put(dec!(100));
    assert_eq!(sized.num_contracts, 4_000_000);

    let session = machine.run(&sized).await.unwrap();
    assert_eq!(session.phase, Phase::Success);
    assert_eq!(
        session.history,
        vec![
            Phase::Idle,
            Phase::CheckingAllowance,
            Phase::Approving,
            Phase::AwaitingApproval,
            Phase::Filling,
            Phase::AwaitingFill,
            Phase::Success,
        ]
    );
    assert_eq!(session.allowance, Some(U256::from(100_000_000u64)));
    assert_eq!(session.allowance_amount(), Some(dec!(100)));
    assert_eq!(chain.approvals(), 1);
    assert_eq!(chain.fills(), 1);

    let fill = chain.last_fill.lock().unwrap().clone().unwrap();
    assert_eq!(fill.num_contracts, 4_000_000);
    assert_eq!(fill.order.price, 2_500_000_000);
    assert_eq!(fill.referrer, address(REFERRER));
}

#[test_log::test(tokio::test)]
async fn test_existing_allowance_skips_approval() {
    let chain = Arc::new(FakeChain::new(BALANCE, BALANCE));
    let machine = machine(chain.clone());

    let session = machine.run(&sized_put(dec!(50))).await.unwrap();
    assert_eq!(session.phase, Phase::Success);
    assert!(!session.history.contains(&Phase::Approving));
    assert_eq!(chain.approvals(), 0);
}

#[test_log::test(tokio::test)]
async fn test_max_approval_wallet_skips_approval() {
    // The usual "unlimited" approval is 2^256 - 1
    let chain = Arc::new(FakeChain::new(U256::MAX, BALANCE));
    let machine = machine(chain.clone());

    let session = machine.run(&sized_put(dec!(100))).await.unwrap();
    assert_eq!(session.phase, Phase::Success);
    assert_eq!(session.allowance, Some(U256::MAX));
    assert_eq!(chain.approvals(), 0);
    assert_eq!(chain.fills(), 1);
}

#[test_log::test(tokio::test)]
async fn test_rejected_approval_then_retry() {
    let chain = Arc::new(FakeChain {
        reject_approve: true,
        ..FakeChain::new(0u64, BALANCE)
    });
    let machine = machine(chain.clone());
    let sized = sized_put(dec!(100));

    let failed = machine.run(&sized).await.unwrap();
    assert_eq!(failed.phase, Phase::Error);
    let failure = failed.error.clone().unwrap();
    assert_eq!(failure.phase, Some(TxPhase::Approval));
    assert_eq!(failure.kind, FailureKind::Rejected);
    assert_eq!(chain.fills(), 0);

    // A retry is a brand new session, starting over at the allowance check
    let retried = machine.retry(&sized).await.unwrap();
    assert_ne!(retried.id, failed.id);
    assert_eq!(retried.history[1], Phase::CheckingAllowance);
    assert_eq!(chain.approvals(), 2);
}

#[test_log::test(tokio::test)]
async fn test_reverted_fill_reports_fill_phase() {
    let chain = Arc::new(FakeChain {
        revert_fill: true,
        ..FakeChain::new(BALANCE, BALANCE)
    });
    let machine = machine(chain);

    let session = machine.run(&sized_put(dec!(100))).await.unwrap();
    let failure = session.error.unwrap();
    assert_eq!(failure.phase, Some(TxPhase::Fill));
    assert_eq!(failure.kind, FailureKind::Reverted);
    assert_eq!(session.fill_tx.as_deref(), Some("0xfill"));
}

#[test_log::test(tokio::test)]
async fn test_insufficient_balance_blocks_before_chain_writes() {
    // 10 USDC available, 100 requested
    let chain = Arc::new(FakeChain::new(0u64, 10_000_000u64));
    let machine = machine(chain.clone());

    let session = machine.run(&sized_put(dec!(100))).await.unwrap();
    let failure = session.error.unwrap();
    assert_eq!(failure.kind, FailureKind::InsufficientBalance);
    assert!(failure.message.contains("available 10"), "{}", failure.message);
    assert_eq!(failure.phase, None);
    assert_eq!(session.history, vec![Phase::Idle, Phase::Error]);
    assert_eq!(chain.approvals(), 0);
    assert_eq!(chain.fills(), 0);
}

#[test_log::test(tokio::test)]
async fn test_sync_notice_posted_after_fill() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_partial_json(serde_json::json!({
            "txHash": "0xfill",
            "asset": "ETH",
            "numContracts": "4000000"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.venue.sync_url = format!("{}/sync", server.uri());
    config.chain.option_book = Some(address(OPTION_BOOK));
    config.chain.referrer = address(REFERRER);
    let machine = config
        .execution_machine(Arc::new(FakeChain::new(BALANCE, BALANCE)))
        .unwrap();

    let session = machine.run(&sized_put(dec!(100))).await.unwrap();
    assert_eq!(session.phase, Phase::Success);

    let mut delivered = false;
    for _ in 0..100 {
        if server.received_requests().await.map_or(0, |r| r.len()) == 1 {
            delivered = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "sync notice was never posted");
}

#[test_log::test(tokio::test)]
async fn test_sync_failure_leaves_session_successful() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = HttpSyncNotifier::new(&server.uri()).unwrap();
    let machine = Arc::new(
        ExecutionStateMachine::new(Arc::new(FakeChain::new(BALANCE, BALANCE)), settings())
            .with_notifier(Arc::new(notifier)),
    );

    let mut observer = machine.spawn(sized_put(dec!(100))).unwrap();
    let session = observer.wait_terminal().await;
    assert_eq!(session.phase, Phase::Success);
    assert!(session.error.is_none());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(observer.current().phase, Phase::Success);
}

#[test_log::test(tokio::test)]
async fn test_second_buy_rejected_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let chain = Arc::new(FakeChain {
        fill_gate: Some(gate.clone()),
        ..FakeChain::new(BALANCE, BALANCE)
    });
    let machine = Arc::new(ExecutionStateMachine::new(chain.clone(), settings()));

    let mut observer = machine.spawn(sized_put(dec!(100))).unwrap();
    assert!(eventually(|| observer.phase() == Phase::Filling).await);
    assert!(!observer.can_detach());
    assert!(machine.is_busy());

    assert!(matches!(
        machine.spawn(sized_put(dec!(10))),
        Err(EngineError::SessionInFlight)
    ));
    assert!(matches!(
        machine.run(&sized_put(dec!(10))).await,
        Err(EngineError::SessionInFlight)
    ));

    gate.notify_one();
    let session = observer.wait_terminal().await;
    assert_eq!(session.phase, Phase::Success);
    assert!(observer.can_detach());
    assert_eq!(chain.fills(), 1);

    // The slot is released once the background task finishes
    assert!(eventually(|| !machine.is_busy()).await);
}

#[test_log::test(tokio::test)]
async fn test_abandoned_run_keeps_session_in_flight() {
    let gate = Arc::new(Notify::new());
    let chain = Arc::new(FakeChain {
        fill_gate: Some(gate.clone()),
        ..FakeChain::new(BALANCE, BALANCE)
    });
    let machine = machine(chain.clone());
    let sized = sized_put(dec!(100));

    // The caller gives up while the fill is outstanding
    let abandoned = timeout(Duration::from_millis(100), machine.run(&sized)).await;
    assert!(abandoned.is_err());

    assert!(machine.is_busy());
    assert!(matches!(
        machine.run(&sized).await,
        Err(EngineError::SessionInFlight)
    ));

    gate.notify_one();
    assert!(eventually(|| !machine.is_busy()).await);
    assert_eq!(chain.fills(), 1);
}

#[test_log::test(tokio::test)]
async fn test_slot_free_once_run_returns() {
    let machine = machine(Arc::new(FakeChain::new(BALANCE, BALANCE)));

    let session = machine.run(&sized_put(dec!(100))).await.unwrap();
    assert_eq!(session.phase, Phase::Success);
    assert!(!machine.is_busy());
    assert!(machine.run(&sized_put(dec!(10))).await.is_ok());
}
