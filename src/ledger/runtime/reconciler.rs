use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::domain::{Cell, Network, Script};
use crate::ledger::engine::reconcile::{reconcile, summarize_history};
use crate::ledger::index::types::{Order, SearchKey, TxWithCell};
use crate::ledger::index::SharedIndex;
use crate::ledger::runtime::readiness::ReadinessGate;
use crate::ledger::runtime::rescan::{RescanCoordinator, RescanReason};
use crate::ledger::runtime::state::{BalanceSnapshot, BalanceWriterId, LedgerState};
use crate::persistence::StateStore;

/// Paging limits for one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileLimits {
    pub history_limit: u32,
    pub cell_page_limit: u32,
    pub max_cell_pages: usize,
}

/// Derives the spendable cell set and balance for the watched script.
///
/// A pass either completes and publishes, or fails and leaves the last
/// published snapshot untouched.
pub struct LiveCellReconciler {
    index: SharedIndex,
    gate: ReadinessGate,
    state: Arc<LedgerState>,
    rescan: Arc<RescanCoordinator>,
    store: StateStore,
    network: Network,
    script: Script,
    limits: ReconcileLimits,
}

impl LiveCellReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: SharedIndex,
        gate: ReadinessGate,
        state: Arc<LedgerState>,
        rescan: Arc<RescanCoordinator>,
        store: StateStore,
        network: Network,
        script: Script,
        limits: ReconcileLimits,
    ) -> Self {
        Self {
            index,
            gate,
            state,
            rescan,
            store,
            network,
            script,
            limits,
        }
    }

    pub async fn reconcile_once(&self, writer: BalanceWriterId) -> LedgerResult<BalanceSnapshot> {
        self.gate.ensure_ready()?;

        let tip = self.index.get_tip_header().await?.number;
        let rows = self.fetch_history().await?;
        let cells = self.fetch_cells().await?;

        let outcome = reconcile(&rows, cells, tip);
        let history = summarize_history(&rows, &self.script, tip);

        if let Some(repair) = outcome.desync {
            self.repair_desync(repair.rescan_from, repair.earliest_block).await?;
        }

        let snapshot = {
            let balance = self.state.balance_writer(writer).await;
            match balance.publish(outcome.balance, outcome.live_cells, outcome.as_of_block) {
                Some(snapshot) => {
                    self.state.publish_history(history);
                    snapshot
                }
                // A newer pass already published; keep its result.
                None => {
                    return balance.current().ok_or_else(|| {
                        LedgerError::ResourceUnavailable("no balance published".to_string())
                    })
                }
            }
        };

        log::info!(
            "[RECONCILE] balance {} across {} live cells as of block {}",
            snapshot.balance,
            snapshot.live_cells.len(),
            snapshot.as_of_block
        );
        Ok(snapshot)
    }

    /// Reconciles every `interval` until cancelled. Failed passes are
    /// logged and retried on the next tick.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        log::info!("[RECONCILE] background loop started ({:?})", interval);
        loop {
            match self.reconcile_once(BalanceWriterId::Reconciler).await {
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    log::warn!("[RECONCILE] pass failed, keeping previous balance: {}", e)
                }
                Err(e) => log::error!("[RECONCILE] pass failed: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        log::info!("[RECONCILE] background loop stopped");
    }

    async fn fetch_history(&self) -> LedgerResult<Vec<TxWithCell>> {
        let page = self
            .index
            .get_transactions(
                SearchKey::lock(self.script.clone()),
                Order::Desc,
                self.limits.history_limit,
                None,
            )
            .await?;
        log::debug!("[RECONCILE] {} history rows", page.objects.len());
        Ok(page.objects)
    }

    async fn fetch_cells(&self) -> LedgerResult<Vec<Cell>> {
        let mut cells = Vec::new();
        let mut cursor = None;

        for _ in 0..self.limits.max_cell_pages {
            let page = self
                .index
                .get_cells(
                    SearchKey::lock(self.script.clone()).with_data(),
                    Order::Asc,
                    self.limits.cell_page_limit,
                    cursor.take(),
                )
                .await?;

            let full = page.objects.len() as u32 >= self.limits.cell_page_limit;
            cells.extend(page.objects.into_iter().map(|c| c.into_cell()));
            if !full {
                log::debug!("[RECONCILE] {} cells", cells.len());
                return Ok(cells);
            }
            cursor = Some(page.last_cursor);
        }

        Err(LedgerError::ResourceUnavailable(format!(
            "cell set larger than {} pages",
            self.limits.max_cell_pages
        )))
    }

    async fn repair_desync(&self, rescan_from: u64, earliest_block: u64) -> LedgerResult<()> {
        let registered_from = self.store.get(self.network).registered_from;
        // Already scanning from at or below the repair point: an empty live
        // set is genuine (everything spent), not a desync.
        if registered_from.is_some_and(|from| from <= rescan_from) {
            log::debug!(
                "[RECONCILE] no live cells but registered from {:?} <= {}, not rescanning",
                registered_from,
                rescan_from
            );
            return Ok(());
        }

        log::warn!(
            "[RECONCILE] history reaches block {} but no live cells, rescanning from {}",
            earliest_block,
            rescan_from
        );
        self.rescan.rescan(rescan_from, RescanReason::Desync).await?;
        Ok(())
    }
}
