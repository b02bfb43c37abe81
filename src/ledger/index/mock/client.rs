use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::ledger::domain::{Script, Transaction};
use crate::ledger::index::api::ChainIndexApi;
use crate::ledger::index::types::{
    CellsCapacity, HeaderView, IndexedCell, IoType, Order, Pagination, ScriptStatus, SearchKey,
    SetScriptsCommand, TransactionWithStatus, TxStatus, TxWithCell,
};

#[derive(Default)]
struct MockState {
    tip: u64,
    headers: HashMap<String, u64>,
    scripts: Vec<ScriptStatus>,
    cells: Vec<IndexedCell>,
    transactions: Vec<TxWithCell>,
    statuses: HashMap<String, VecDeque<TxStatus>>,
    send_results: VecDeque<Result<String, IndexError>>,
    failures: HashMap<&'static str, VecDeque<IndexError>>,
    calls: HashMap<&'static str, usize>,
    set_scripts_log: Vec<(SetScriptsCommand, Vec<ScriptStatus>)>,
    sent: Vec<Transaction>,
}

/// Scriptable in-memory chain index for tests.
///
/// Status queues advance one entry per `get_transaction` call; the last
/// entry sticks.
#[derive(Default)]
pub struct MockChainIndex {
    state: Mutex<MockState>,
}

impl MockChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    pub fn set_tip(&self, tip: u64) {
        self.with(|s| s.tip = tip);
    }

    pub fn add_header(&self, hash: &str, number: u64) {
        self.with(|s| {
            s.headers.insert(hash.to_ascii_lowercase(), number);
        });
    }

    pub fn add_cell(&self, cell: IndexedCell) {
        self.with(|s| s.cells.push(cell));
    }

    pub fn remove_cell(&self, tx_hash: &str, index: u32) {
        self.with(|s| {
            s.cells.retain(|c| {
                !(c.out_point.tx_hash.eq_ignore_ascii_case(tx_hash) && c.out_point.index == index)
            })
        });
    }

    pub fn add_transaction(&self, row: TxWithCell) {
        self.with(|s| s.transactions.push(row));
    }

    pub fn register_script(&self, status: ScriptStatus) {
        self.with(|s| upsert(&mut s.scripts, status));
    }

    pub fn push_status(&self, tx_hash: &str, status: TxStatus) {
        self.with(|s| {
            s.statuses
                .entry(tx_hash.to_ascii_lowercase())
                .or_default()
                .push_back(status)
        });
    }

    pub fn push_send_result(&self, result: Result<String, IndexError>) {
        self.with(|s| s.send_results.push_back(result));
    }

    /// Makes the next call to `method` fail with `err`.
    pub fn fail_next(&self, method: &'static str, err: IndexError) {
        self.with(|s| s.failures.entry(method).or_default().push_back(err));
    }

    pub fn calls(&self, method: &str) -> usize {
        self.with(|s| s.calls.get(method).copied().unwrap_or(0))
    }

    pub fn set_scripts_log(&self) -> Vec<(SetScriptsCommand, Vec<ScriptStatus>)> {
        self.with(|s| s.set_scripts_log.clone())
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.with(|s| s.sent.clone())
    }

    pub fn script_progress(&self, script: &Script) -> Option<u64> {
        self.with(|s| {
            s.scripts
                .iter()
                .find(|st| &st.script == script)
                .map(|st| st.block_number)
        })
    }

    fn enter(&self, method: &'static str) -> Result<(), IndexError> {
        self.with(|s| {
            *s.calls.entry(method).or_default() += 1;
            match s.failures.get_mut(method).and_then(|q| q.pop_front()) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

fn upsert(scripts: &mut Vec<ScriptStatus>, status: ScriptStatus) {
    match scripts.iter_mut().find(|s| s.script == status.script) {
        Some(existing) => *existing = status,
        None => scripts.push(status),
    }
}

fn page<T: Clone>(items: &[T], limit: u32, after: Option<String>) -> Pagination<T> {
    let start = after.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + limit as usize).min(items.len());
    let objects = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    Pagination {
        objects,
        last_cursor: end.to_string(),
    }
}

#[async_trait]
impl ChainIndexApi for MockChainIndex {
    async fn get_tip_header(&self) -> Result<HeaderView, IndexError> {
        self.enter("get_tip_header")?;
        Ok(self.with(|s| HeaderView {
            hash: format!("0x{:064x}", s.tip),
            number: s.tip,
            timestamp: 0,
        }))
    }

    async fn get_header(&self, block_hash: &str) -> Result<Option<HeaderView>, IndexError> {
        self.enter("get_header")?;
        Ok(self.with(|s| {
            s.headers
                .get(&block_hash.to_ascii_lowercase())
                .map(|&number| HeaderView {
                    hash: block_hash.to_string(),
                    number,
                    timestamp: 0,
                })
        }))
    }

    async fn set_scripts(
        &self,
        scripts: Vec<ScriptStatus>,
        command: SetScriptsCommand,
    ) -> Result<(), IndexError> {
        self.enter("set_scripts")?;
        self.with(|s| {
            s.set_scripts_log.push((command, scripts.clone()));
            match command {
                SetScriptsCommand::All => s.scripts = scripts,
                SetScriptsCommand::Partial => {
                    for status in scripts {
                        upsert(&mut s.scripts, status);
                    }
                }
                SetScriptsCommand::Delete => {
                    s.scripts
                        .retain(|existing| !scripts.iter().any(|d| d.script == existing.script));
                }
            }
        });
        Ok(())
    }

    async fn get_scripts(&self) -> Result<Vec<ScriptStatus>, IndexError> {
        self.enter("get_scripts")?;
        Ok(self.with(|s| s.scripts.clone()))
    }

    async fn get_cells_capacity(&self, key: SearchKey) -> Result<CellsCapacity, IndexError> {
        self.enter("get_cells_capacity")?;
        Ok(self.with(|s| CellsCapacity {
            capacity: s
                .cells
                .iter()
                .filter(|c| c.output.lock == key.script)
                .map(|c| c.output.capacity)
                .sum(),
            block_hash: format!("0x{:064x}", s.tip),
            block_number: s.tip,
        }))
    }

    async fn get_cells(
        &self,
        key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<IndexedCell>, IndexError> {
        self.enter("get_cells")?;
        let mut cells: Vec<IndexedCell> = self.with(|s| {
            s.cells
                .iter()
                .filter(|c| c.output.lock == key.script)
                .cloned()
                .collect()
        });
        cells.sort_by_key(|c| (c.block_number, c.tx_index, c.out_point.index));
        if order == Order::Desc {
            cells.reverse();
        }
        Ok(page(&cells, limit, after))
    }

    async fn get_transactions(
        &self,
        _key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<TxWithCell>, IndexError> {
        self.enter("get_transactions")?;
        let mut rows = self.with(|s| s.transactions.clone());
        rows.sort_by_key(|r| (r.block_number, r.tx_index, r.io_type == IoType::Output, r.io_index));
        if order == Order::Desc {
            rows.reverse();
        }
        Ok(page(&rows, limit, after))
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<String, IndexError> {
        self.enter("send_transaction")?;
        self.with(|s| {
            let result = s
                .send_results
                .pop_front()
                .unwrap_or_else(|| Ok(format!("0x{:064x}", s.sent.len() + 1)));
            if result.is_ok() {
                s.sent.push(tx.clone());
            }
            result
        })
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionWithStatus, IndexError> {
        self.enter("get_transaction")?;
        Ok(self.with(|s| {
            let tx_status = match s.statuses.get_mut(&tx_hash.to_ascii_lowercase()) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(TxStatus::unknown),
                Some(queue) => queue.front().cloned().unwrap_or_else(TxStatus::unknown),
                None => TxStatus::unknown(),
            };
            TransactionWithStatus { tx_status }
        }))
    }
}
