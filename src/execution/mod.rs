//! Execution module - two-phase on-chain settlement of a sized quote

pub mod machine;
pub mod session;
pub mod sync;

pub use machine::{ExecutionSettings, ExecutionStateMachine};
pub use session::{
    FailureKind, Phase, SessionFailure, SessionObserver, SessionSlot, SlotGuard,
    TransactionSession,
};
pub use sync::{dispatch as dispatch_sync, HttpSyncNotifier};
