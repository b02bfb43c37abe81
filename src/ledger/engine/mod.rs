//! Pure decision code for the ledger.
//!
//! Nothing in here performs IO or awaits: callers feed in what the index
//! returned and execute whatever the engine decides.
//! - `reconcile` turns raw cell and transaction rows into a live cell set,
//!   a balance, a desync verdict and per-transaction records.
//! - `lifecycle` maps status observations of a submitted transaction into
//!   states and commands for the tracker to run.

pub mod lifecycle;
pub mod reconcile;

#[cfg(test)]
mod tests;

pub use lifecycle::{
    LifecycleCommand, LifecycleEvent, LifecycleMachine, LifecycleSnapshot, SendState,
    StatusObservation,
};
pub use reconcile::{reconcile, summarize_history, DesyncRepair, Reconciliation};
