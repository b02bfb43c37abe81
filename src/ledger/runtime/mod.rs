//! Async shell around the ledger engine: readiness, observable state,
//! rescans, reconciliation and transaction tracking.

pub mod readiness;
pub mod reconciler;
pub mod rescan;
pub mod state;
pub mod tracker;
pub mod wallet;


pub use readiness::{Readiness, ReadinessGate};
pub use reconciler::LiveCellReconciler;
pub use rescan::{RescanCoordinator, RescanOutcome, RescanReason};
pub use state::{BalanceSnapshot, LedgerState, RegistrationSnapshot};
pub use tracker::TransactionLifecycleTracker;
pub use wallet::{AccountStatus, LedgerWallet};
