//! Live cell derivation and history summarisation over raw index rows.

use std::collections::{BTreeMap, BTreeSet};

use crate::ledger::domain::{Cell, Direction, OutPoint, Script, TransactionRecord, TransactionView};
use crate::ledger::index::types::{IoType, TxWithCell};

/// Blocks rewound below the earliest known transaction when repairing a
/// desynced index.
pub const DESYNC_MARGIN: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesyncRepair {
    pub earliest_block: u64,
    pub rescan_from: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub live_cells: Vec<Cell>,
    pub balance: u64,
    pub as_of_block: u64,
    pub spent: BTreeSet<OutPoint>,
    /// Cells the index still reported although a known transaction spends them.
    pub excluded: usize,
    pub desync: Option<DesyncRepair>,
}

/// Every out point consumed by any of the given transactions.
pub fn spent_set(rows: &[TxWithCell]) -> BTreeSet<OutPoint> {
    let mut seen = BTreeSet::new();
    let mut spent = BTreeSet::new();
    for row in rows {
        if !seen.insert(row.tx_hash().to_ascii_lowercase()) {
            continue;
        }
        for input in &row.transaction.inner.inputs {
            spent.insert(input.previous_output.normalized());
        }
    }
    spent
}

/// Drops spent and duplicate cells. Returns the live set and how many cells
/// were excluded as spent.
pub fn live_cells(cells: Vec<Cell>, spent: &BTreeSet<OutPoint>) -> (Vec<Cell>, usize) {
    let mut live: BTreeMap<OutPoint, Cell> = BTreeMap::new();
    let mut excluded = 0;
    for cell in cells {
        let key = cell.out_point.normalized();
        if spent.contains(&key) {
            log::trace!("[RECONCILE] excluding spent cell {}", key);
            excluded += 1;
            continue;
        }
        live.entry(key).or_insert(cell);
    }
    (live.into_values().collect(), excluded)
}

pub fn total_capacity(cells: &[Cell]) -> u64 {
    cells
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.capacity))
}

/// History without any live cell means the index has not yet reached the
/// block holding our outputs.
pub fn detect_desync(live: &[Cell], rows: &[TxWithCell], margin: u64) -> Option<DesyncRepair> {
    if !live.is_empty() {
        return None;
    }
    let earliest_block = rows.iter().map(|r| r.block_number).min()?;
    Some(DesyncRepair {
        earliest_block,
        rescan_from: earliest_block.saturating_sub(margin),
    })
}

pub fn reconcile(rows: &[TxWithCell], cells: Vec<Cell>, as_of_block: u64) -> Reconciliation {
    let spent = spent_set(rows);
    let (live, excluded) = live_cells(cells, &spent);
    let balance = total_capacity(&live);
    let desync = detect_desync(&live, rows, DESYNC_MARGIN);

    log::debug!(
        "[RECONCILE] {} live cells, {} spent out points, {} excluded, balance {}",
        live.len(),
        spent.len(),
        excluded,
        balance
    );

    Reconciliation {
        live_cells: live,
        balance,
        as_of_block,
        spent,
        excluded,
        desync,
    }
}

struct Grouped<'a> {
    view: &'a TransactionView,
    block_number: u64,
    tx_index: u32,
    inputs: BTreeMap<u32, Option<u64>>,
    output_rows: usize,
}

/// Folds per-cell rows into one record per transaction, most recent first.
pub fn summarize_history(rows: &[TxWithCell], script: &Script, tip: u64) -> Vec<TransactionRecord> {
    let mut groups: BTreeMap<String, Grouped<'_>> = BTreeMap::new();
    for row in rows {
        let entry = groups
            .entry(row.tx_hash().to_ascii_lowercase())
            .or_insert_with(|| Grouped {
                view: &row.transaction,
                block_number: row.block_number,
                tx_index: row.tx_index,
                inputs: BTreeMap::new(),
                output_rows: 0,
            });
        match row.io_type {
            IoType::Input => {
                let slot = entry.inputs.entry(row.io_index).or_insert(None);
                if slot.is_none() {
                    *slot = row.io_capacity;
                }
            }
            IoType::Output => entry.output_rows += 1,
        }
    }

    let mut records: Vec<TransactionRecord> = groups
        .iter()
        .map(|(hash, g)| summarize_one(hash, g, &groups, script, tip))
        .collect();

    records.sort_by(|a, b| {
        b.block_number
            .cmp(&a.block_number)
            .then(b.tx_index.cmp(&a.tx_index))
    });
    records
}

fn summarize_one(
    hash: &str,
    g: &Grouped<'_>,
    groups: &BTreeMap<String, Grouped<'_>>,
    script: &Script,
    tip: u64,
) -> TransactionRecord {
    let tx = &g.view.inner;

    let mut our_in = 0u64;
    let mut all_resolved = true;
    for (&io_index, &capacity) in &g.inputs {
        let capacity = capacity.or_else(|| {
            let previous = tx.inputs.get(io_index as usize).map(|i| &i.previous_output);
            resolve_input(previous, groups)
        });
        match capacity {
            Some(c) => our_in = our_in.saturating_add(c),
            None => all_resolved = false,
        }
    }

    let (mut our_out, mut others_out) = (0u64, 0u64);
    for output in &tx.outputs {
        if &output.lock == script {
            our_out = our_out.saturating_add(output.capacity);
        } else {
            others_out = others_out.saturating_add(output.capacity);
        }
    }

    let has_in = !g.inputs.is_empty();
    let has_out = our_out > 0 || g.output_rows > 0;

    let (direction, amount) = match (has_in, has_out) {
        (true, _) if others_out > 0 => (Direction::Out, others_out),
        (true, true) => (Direction::SelfTransfer, our_out),
        (false, true) => (Direction::In, our_out),
        (true, false) => (Direction::Out, 0),
        (false, false) => (Direction::Unknown, 0),
    };

    let total_out = our_out.saturating_add(others_out);
    let fee = if g.inputs.len() == tx.inputs.len() && all_resolved && our_in >= total_out {
        our_in - total_out
    } else {
        0
    };

    let confirmations = if tip == 0 || g.block_number > tip {
        0
    } else {
        tip - g.block_number + 1
    };

    log::trace!(
        "[RECONCILE] {} block {} {:?} amount {} fee {}",
        hash,
        g.block_number,
        direction,
        amount,
        fee
    );

    TransactionRecord {
        tx_hash: g.view.hash.clone(),
        block_number: g.block_number,
        tx_index: g.tx_index,
        direction,
        amount,
        balance_change: i128::from(our_out) - i128::from(our_in),
        fee,
        confirmations,
    }
}

fn resolve_input(
    previous: Option<&OutPoint>,
    groups: &BTreeMap<String, Grouped<'_>>,
) -> Option<u64> {
    let previous = previous?;
    let source = groups.get(&previous.tx_hash.to_ascii_lowercase())?;
    source
        .view
        .inner
        .outputs
        .get(previous.index as usize)
        .map(|o| o.capacity)
}
