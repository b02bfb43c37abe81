use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[serde(rename = "self")]
    SelfTransfer,
    Unknown,
}

/// One wallet-relevant transaction, derived from the index's per-cell rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub block_number: u64,
    pub tx_index: u32,
    pub direction: Direction,
    /// Amount shown to the user: received, sent to others, or moved to self.
    pub amount: u64,
    /// Our outputs minus our inputs.
    pub balance_change: i128,
    /// Zero when not every input belongs to the watched script.
    pub fee: u64,
    pub confirmations: u64,
}
