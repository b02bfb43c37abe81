//! Application-facing facade over the ledger runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::ledger::address::Address;
use crate::ledger::builder::{Signer, TransactionBuilder, UnsignedTransfer};
use crate::ledger::checkpoint::SyncCheckpointResolver;
use crate::ledger::domain::{SyncMode, Transaction, TransactionRecord};
use crate::ledger::engine::lifecycle::LifecycleSnapshot;
use crate::ledger::index::types::SearchKey;
use crate::ledger::index::SharedIndex;
use crate::ledger::runtime::readiness::{Readiness, ReadinessGate};
use crate::ledger::runtime::reconciler::{LiveCellReconciler, ReconcileLimits};
use crate::ledger::runtime::rescan::{RescanCoordinator, RescanOutcome, RescanReason};
use crate::ledger::runtime::state::{BalanceSnapshot, BalanceWriterId, LedgerState};
use crate::ledger::runtime::tracker::{TrackerDeps, TransactionLifecycleTracker};
use crate::persistence::StateStore;

/// `synced / tip` at or above this counts as synced.
pub const SYNCED_THRESHOLD: f64 = 0.9999;

const PROBE_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountStatus {
    pub address: String,
    pub is_registered: bool,
    pub tip: u64,
    pub synced_to_block: u64,
    pub sync_progress: f64,
    pub is_synced: bool,
    /// Capacity the index itself reports for the script, spent-but-not-yet
    /// -indexed cells included. Zero when not registered.
    pub indexed_capacity: u64,
}

pub struct LedgerWallet {
    config: LedgerConfig,
    address: Address,
    index: SharedIndex,
    store: StateStore,
    gate: ReadinessGate,
    state: Arc<LedgerState>,
    resolver: SyncCheckpointResolver,
    rescan: Arc<RescanCoordinator>,
    reconciler: Arc<LiveCellReconciler>,
    tracker: TransactionLifecycleTracker,
    builder: TransactionBuilder,
}

impl LedgerWallet {
    pub fn new(
        config: LedgerConfig,
        address: Address,
        index: SharedIndex,
        store: StateStore,
    ) -> LedgerResult<Self> {
        if address.network() != config.network {
            return Err(ValidationError::NetworkMismatch {
                expected: config.network,
                found: address.network(),
            }
            .into());
        }

        let network = config.network;
        let script = address.script().clone();
        let gate = ReadinessGate::new();
        let state = Arc::new(LedgerState::new());

        let rescan = Arc::new(RescanCoordinator::new(
            index.clone(),
            store.clone(),
            state.clone(),
            network,
            script.clone(),
        ));

        let reconciler = Arc::new(LiveCellReconciler::new(
            index.clone(),
            gate.clone(),
            state.clone(),
            rescan.clone(),
            store.clone(),
            network,
            script,
            ReconcileLimits {
                history_limit: config.history_limit,
                cell_page_limit: config.cell_page_limit,
                max_cell_pages: config.max_cell_pages,
            },
        ));

        let tracker = TransactionLifecycleTracker::new(TrackerDeps {
            index: index.clone(),
            gate: gate.clone(),
            rescan: rescan.clone(),
            reconciler: reconciler.clone(),
            store: store.clone(),
            network,
            poll: config.poll,
            propagation_delay: config.propagation_delay,
            rescan_depth: config.post_submit_rescan_depth,
        });

        let persisted = store.get(network);
        state.update_registration(|r| {
            r.registered_from = persisted.registered_from;
            r.synced_to_block = persisted.last_synced_block;
            r.revision = persisted.revision;
        });

        Ok(Self {
            resolver: SyncCheckpointResolver::for_network(network),
            builder: TransactionBuilder::new(network, config.fee),
            config,
            address,
            index,
            store,
            gate,
            state,
            rescan,
            reconciler,
            tracker,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn readiness(&self) -> Readiness {
        self.gate.current()
    }

    /// Probes the index until it answers or the configured timeout passes.
    /// A timeout leaves the gate in its terminal failed state.
    pub async fn start(&self) -> LedgerResult<u64> {
        let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
        loop {
            match self.gate.probe(self.index.as_ref()).await {
                Ok(tip) => {
                    log::info!("[WALLET] chain index ready at tip {}", tip);
                    return Ok(tip);
                }
                Err(e) if tokio::time::Instant::now() + PROBE_RETRY >= deadline => {
                    self.gate.mark_failed(e.to_string());
                    return Err(LedgerError::ResourceUnavailable(format!(
                        "chain index not ready: {}",
                        e
                    )));
                }
                Err(_) => tokio::time::sleep(PROBE_RETRY).await,
            }
        }
    }

    pub fn balance(&self) -> Option<BalanceSnapshot> {
        self.state.balance()
    }

    pub fn balance_stream(&self) -> watch::Receiver<Option<BalanceSnapshot>> {
        self.state.subscribe_balance()
    }

    pub fn history(&self) -> Vec<TransactionRecord> {
        self.state.history()
    }

    pub fn history_stream(&self) -> watch::Receiver<Vec<TransactionRecord>> {
        self.state.subscribe_history()
    }

    pub fn lifecycle_stream(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.tracker.subscribe()
    }

    /// Registers the watched script from the block `mode` resolves to.
    pub async fn register(&self, mode: SyncMode) -> LedgerResult<RescanOutcome> {
        self.reregister(mode, RescanReason::Register(mode)).await
    }

    /// Explicit user resync; may move the scan position either way.
    pub async fn resync(&self, mode: SyncMode) -> LedgerResult<RescanOutcome> {
        self.reregister(mode, RescanReason::Resync(mode)).await
    }

    async fn reregister(&self, mode: SyncMode, reason: RescanReason) -> LedgerResult<RescanOutcome> {
        self.gate.ensure_ready()?;
        let tip = self.index.get_tip_header().await?.number;
        let from = self.resolver.resolve(mode, tip);
        log::info!("[WALLET] {:?} from block {} (tip {})", mode, from, tip);
        self.rescan.rescan(from, reason).await
    }

    pub async fn account_status(&self) -> LedgerResult<AccountStatus> {
        self.gate.ensure_ready()?;
        let tip = self.index.get_tip_header().await?.number;
        let progress = self.rescan.script_progress().await?;
        let synced_to_block = progress.unwrap_or(0);
        let indexed_capacity = match progress {
            Some(_) => {
                self.index
                    .get_cells_capacity(SearchKey::lock(self.address.script().clone()))
                    .await?
                    .capacity
            }
            None => 0,
        };

        let sync_progress = if tip == 0 {
            0.0
        } else {
            (synced_to_block as f64 / tip as f64).min(1.0)
        };

        if progress.is_some() {
            if let Err(e) = self
                .store
                .update(self.config.network, |s| s.last_synced_block = synced_to_block)
            {
                log::warn!("[WALLET] could not persist sync progress: {:#}", e);
            }
        }
        self.state.update_registration(|r| {
            r.is_registered = progress.is_some();
            r.synced_to_block = synced_to_block;
            r.tip = tip;
        });

        Ok(AccountStatus {
            address: self.address.encode()?,
            is_registered: progress.is_some(),
            tip,
            synced_to_block,
            sync_progress,
            is_synced: sync_progress >= SYNCED_THRESHOLD,
            indexed_capacity,
        })
    }

    pub async fn refresh(&self) -> LedgerResult<BalanceSnapshot> {
        self.reconciler
            .reconcile_once(BalanceWriterId::Reconciler)
            .await
    }

    /// Starts the periodic reconciliation loop.
    pub fn spawn_reconcile_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            self.reconciler
                .clone()
                .run(self.config.reconcile_interval, cancel),
        )
    }

    /// Builds an unsigned transfer from the last published live cell set.
    /// Issues no index queries and never triggers a rescan.
    pub fn build(&self, to: &str, amount: u64) -> LedgerResult<UnsignedTransfer> {
        let to = Address::parse_for(to, self.config.network)?;
        self.gate.ensure_ready()?;
        let snapshot = self.state.balance().ok_or_else(|| {
            LedgerError::ResourceUnavailable("no reconciled balance yet, wait for sync".to_string())
        })?;
        self.builder
            .build_unsigned(&self.address, &to, amount, &snapshot.live_cells)
    }

    /// Builds, signs and broadcasts; returns the transaction hash. Progress
    /// is observable through [`LedgerWallet::lifecycle_stream`].
    pub async fn send(&self, to: &str, amount: u64, signer: &dyn Signer) -> LedgerResult<String> {
        let unsigned = self.build(to, amount)?;
        let signed = self.builder.sign(unsigned, signer)?;
        self.tracker.submit(&signed.transaction).await
    }

    /// Broadcasts an already signed transaction.
    pub async fn submit(&self, tx: &Transaction) -> LedgerResult<String> {
        self.tracker.submit(tx).await
    }

    pub fn track(&self, tx_hash: &str) -> LedgerResult<()> {
        self.tracker.track(tx_hash)
    }

    /// Resumes tracking a send persisted by an earlier session.
    pub fn resume_pending(&self) -> LedgerResult<Option<String>> {
        match self.store.get(self.config.network).pending_send {
            Some(pending) => {
                log::info!("[WALLET] resuming tracking of {}", pending.tx_hash);
                self.tracker.track(&pending.tx_hash)?;
                Ok(Some(pending.tx_hash))
            }
            None => Ok(None),
        }
    }

    pub fn cancel_tracking(&self) {
        self.tracker.cancel();
    }

    pub async fn wait_tracking(&self) {
        self.tracker.join().await;
    }
}
