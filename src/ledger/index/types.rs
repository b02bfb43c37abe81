//! JSON-RPC wire types of the CKB light client indexer.

use serde::{Deserialize, Serialize};

use crate::ledger::domain::quantity::{hex_u32, hex_u64, option_hex_u64};
use crate::ledger::domain::{Cell, CellOutput, OutPoint, Script, TransactionView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Lock,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetScriptsCommand {
    /// Replace every registered script.
    All,
    /// Insert or update the given scripts only.
    Partial,
    Delete,
}

/// A registered script and the block it has been filtered up to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStatus {
    pub script: Script,
    pub script_type: ScriptType,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
}

impl ScriptStatus {
    pub fn lock(script: Script, block_number: u64) -> Self {
        Self {
            script,
            script_type: ScriptType::Lock,
            block_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchKey {
    pub script: Script,
    pub script_type: ScriptType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_transaction: Option<bool>,
}

impl SearchKey {
    pub fn lock(script: Script) -> Self {
        Self {
            script,
            script_type: ScriptType::Lock,
            with_data: None,
            group_by_transaction: None,
        }
    }

    pub fn with_data(mut self) -> Self {
        self.with_data = Some(true);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination<T> {
    pub objects: Vec<T>,
    pub last_cursor: String,
}

/// Cell as returned by `get_cells`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedCell {
    pub output: CellOutput,
    #[serde(default)]
    pub output_data: Option<String>,
    pub out_point: OutPoint,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
    #[serde(with = "hex_u32")]
    pub tx_index: u32,
}

impl IndexedCell {
    pub fn into_cell(self) -> Cell {
        Cell {
            out_point: self.out_point.normalized(),
            capacity: self.output.capacity,
            lock: self.output.lock.normalized(),
            type_script: self.output.type_script,
            data: self.output_data.unwrap_or_else(|| "0x".to_string()),
            block_number: self.block_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    Input,
    Output,
}

/// One row of `get_transactions`: a transaction seen through one of its
/// inputs or outputs that matched the search key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxWithCell {
    pub transaction: TransactionView,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
    #[serde(with = "hex_u32")]
    pub tx_index: u32,
    #[serde(with = "hex_u32")]
    pub io_index: u32,
    pub io_type: IoType,
    #[serde(default, with = "option_hex_u64", skip_serializing_if = "Option::is_none")]
    pub io_capacity: Option<u64>,
}

impl TxWithCell {
    pub fn tx_hash(&self) -> &str {
        &self.transaction.hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellsCapacity {
    #[serde(with = "hex_u64")]
    pub capacity: u64,
    pub block_hash: String,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderView {
    pub hash: String,
    #[serde(with = "hex_u64")]
    pub number: u64,
    #[serde(with = "hex_u64")]
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatusKind {
    Pending,
    Proposed,
    Committed,
    Rejected,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub status: TxStatusKind,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TxStatus {
    pub fn unknown() -> Self {
        Self {
            status: TxStatusKind::Unknown,
            block_hash: None,
            reason: None,
        }
    }
}

/// `get_transaction` result; the transaction body itself is not needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithStatus {
    pub tx_status: TxStatus,
}
