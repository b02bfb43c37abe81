//! Error taxonomy shared by the ledger library.
//!
//! Pending status and poll timeouts are lifecycle states, not errors, so
//! they have no variant here.

use thiserror::Error;

use crate::ledger::domain::Network;

/// Failure talking to the chain index service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("cannot decode response: {0}")]
    Decode(String),
}

/// Input rejected before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount {amount} is below the minimum cell capacity {minimum}")]
    AmountBelowMinimum { amount: u64, minimum: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("address is for {found}, wallet is on {expected}")]
    NetworkMismatch { expected: Network, found: Network },

    #[error("unsupported lock script: {0}")]
    UnsupportedLock(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Service not ready, or nothing synced yet. Wait and retry.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("index query failed: {0}")]
    Index(#[from] IndexError),

    #[error("state store: {0}")]
    Store(String),
}

impl LedgerError {
    /// Whether the caller may simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ResourceUnavailable(_) | LedgerError::Index(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LedgerError::ResourceUnavailable("syncing".into()).is_retryable());
        assert!(LedgerError::Index(IndexError::Transport("reset".into())).is_retryable());
        assert!(!LedgerError::InsufficientFunds { required: 10, available: 1 }.is_retryable());
        assert!(!LedgerError::Broadcast("rejected".into()).is_retryable());
        assert!(!LedgerError::from(ValidationError::InvalidAddress("x".into())).is_retryable());
    }
}
