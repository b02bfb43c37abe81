//! Ledger reconciliation and transaction construction for a CKB wallet
//! backed by a light client index.
//!
//! - `ledger::engine` holds the pure decision code.
//! - `ledger::runtime` drives it against a [`ledger::index::ChainIndexApi`].
//! - `persistence` keeps the small per-network state file.

pub mod config;
pub mod error;
pub mod ledger;
pub mod persistence;

pub use error::{IndexError, LedgerError, LedgerResult, ValidationError};
