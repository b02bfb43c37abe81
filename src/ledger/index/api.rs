use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::ledger::domain::Transaction;
use crate::ledger::index::types::{
    CellsCapacity, HeaderView, IndexedCell, Order, Pagination, ScriptStatus, SearchKey,
    SetScriptsCommand, TransactionWithStatus, TxWithCell,
};

/// The narrow surface of the chain index service the ledger depends on.
///
/// Implementations are expected to be cheap to share; every method takes
/// `&self`.
#[async_trait]
pub trait ChainIndexApi: Send + Sync {
    async fn get_tip_header(&self) -> Result<HeaderView, IndexError>;

    /// `None` when the header is not known to the index.
    async fn get_header(&self, block_hash: &str) -> Result<Option<HeaderView>, IndexError>;

    async fn set_scripts(
        &self,
        scripts: Vec<ScriptStatus>,
        command: SetScriptsCommand,
    ) -> Result<(), IndexError>;

    async fn get_scripts(&self) -> Result<Vec<ScriptStatus>, IndexError>;

    async fn get_cells_capacity(&self, key: SearchKey) -> Result<CellsCapacity, IndexError>;

    async fn get_cells(
        &self,
        key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<IndexedCell>, IndexError>;

    async fn get_transactions(
        &self,
        key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<TxWithCell>, IndexError>;

    /// Returns the transaction hash assigned by the node.
    async fn send_transaction(&self, tx: &Transaction) -> Result<String, IndexError>;

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionWithStatus, IndexError>;
}

pub type SharedIndex = Arc<dyn ChainIndexApi>;
