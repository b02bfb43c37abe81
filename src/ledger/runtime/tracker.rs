//! Follows a submitted transaction until it confirms, fails or the poll
//! budget runs out. Decisions come from [`LifecycleMachine`]; this module
//! only performs the IO it asks for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PollSchedule;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::domain::{Network, Transaction};
use crate::ledger::engine::lifecycle::{
    LifecycleCommand, LifecycleEvent, LifecycleMachine, LifecycleSnapshot, StatusObservation,
};
use crate::ledger::index::types::TxStatusKind;
use crate::ledger::index::SharedIndex;
use crate::ledger::runtime::readiness::ReadinessGate;
use crate::ledger::runtime::reconciler::LiveCellReconciler;
use crate::ledger::runtime::rescan::{RescanCoordinator, RescanReason};
use crate::ledger::runtime::state::BalanceWriterId;
use crate::persistence::{PendingSend, StateStore};

pub struct TrackerDeps {
    pub index: SharedIndex,
    pub gate: ReadinessGate,
    pub rescan: Arc<RescanCoordinator>,
    pub reconciler: Arc<LiveCellReconciler>,
    pub store: StateStore,
    pub network: Network,
    pub poll: PollSchedule,
    pub propagation_delay: Duration,
    pub rescan_depth: u64,
}

struct Shared {
    deps: TrackerDeps,
    snapshots: watch::Sender<LifecycleSnapshot>,
    /// Bumped whenever a new send or track replaces the active one.
    generation: AtomicU64,
}

struct ActivePoll {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

pub struct TransactionLifecycleTracker {
    shared: Arc<Shared>,
    active: Mutex<Option<ActivePoll>>,
}

impl TransactionLifecycleTracker {
    pub fn new(deps: TrackerDeps) -> Self {
        let (snapshots, _) = watch::channel(LifecycleSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                deps,
                snapshots,
                generation: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Broadcasts `tx` and starts following it. The broadcast itself is
    /// never cancelled, only the tracking that follows.
    pub async fn submit(&self, tx: &Transaction) -> LedgerResult<String> {
        self.shared.deps.gate.ensure_ready()?;

        let generation = self.supersede();
        let mut machine = self.machine();
        let cmds = machine.handle_event(LifecycleEvent::SendStarted);
        self.shared.apply_publishes(&cmds, generation);

        match self.shared.deps.index.send_transaction(tx).await {
            Ok(tx_hash) => {
                log::info!("[TRACKER] broadcast accepted: {}", tx_hash);
                let cmds = machine.handle_event(LifecycleEvent::Broadcasted {
                    tx_hash: tx_hash.clone(),
                });
                self.spawn(machine, cmds, generation);
                Ok(tx_hash)
            }
            Err(e) => {
                let reason = e.to_string();
                log::warn!("[TRACKER] broadcast rejected: {}", reason);
                let cmds = machine.handle_event(LifecycleEvent::BroadcastRejected {
                    reason: reason.clone(),
                });
                self.shared.apply_publishes(&cmds, generation);
                Err(LedgerError::Broadcast(reason))
            }
        }
    }

    /// Follows a transaction that was broadcast earlier.
    pub fn track(&self, tx_hash: &str) -> LedgerResult<()> {
        self.shared.deps.gate.ensure_ready()?;

        let generation = self.supersede();
        let mut machine = self.machine();
        let cmds = machine.handle_event(LifecycleEvent::TrackingStarted {
            tx_hash: tx_hash.to_ascii_lowercase(),
        });
        self.spawn(machine, cmds, generation);
        Ok(())
    }

    /// Stops status polling, keeping the last known state.
    pub fn cancel(&self) {
        if let Some(active) = self.lock_active().as_ref() {
            active.cancel.cancel();
        }
    }

    /// Waits for the active polling task, if any, to stop.
    pub async fn join(&self) {
        let handle = self.lock_active().as_mut().and_then(|a| a.handle.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("[TRACKER] polling task ended abnormally: {}", e);
            }
        }
    }

    fn machine(&self) -> LifecycleMachine {
        let poll = self.shared.deps.poll;
        LifecycleMachine::new(poll.required_confirmations, poll.max_attempts)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActivePoll>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Cancels any stale polling task and claims a fresh generation.
    fn supersede(&self) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = self.lock_active().take() {
            log::debug!("[TRACKER] superseding previous tracking task");
            old.cancel.cancel();
        }
        generation
    }

    fn spawn(&self, machine: LifecycleMachine, cmds: Vec<LifecycleCommand>, generation: u64) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drive(
            self.shared.clone(),
            machine,
            cmds,
            cancel.clone(),
            generation,
        ));
        *self.lock_active() = Some(ActivePoll {
            cancel,
            handle: Some(handle),
        });
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut machine: LifecycleMachine,
    mut pending: Vec<LifecycleCommand>,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let mut poll_again = false;
        for cmd in pending.drain(..) {
            match cmd {
                LifecycleCommand::Publish(snapshot) => shared.publish(snapshot, generation),
                LifecycleCommand::ScheduleChangeRescan { tx_hash } => {
                    shared.schedule_change_rescan(tx_hash)
                }
                LifecycleCommand::PollAgain => poll_again = true,
                LifecycleCommand::RefreshBalance => shared.refresh_balance().await,
                LifecycleCommand::StopPolling => return,
            }
        }
        if !poll_again {
            return;
        }

        let Some(tx_hash) = machine.snapshot().tx_hash.clone() else {
            return;
        };

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => LifecycleEvent::Cancelled,
            event = async {
                tokio::time::sleep(shared.deps.poll.interval).await;
                shared.observe(&tx_hash).await
            } => event,
        };
        pending = machine.handle_event(event);
    }
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn apply_publishes(&self, cmds: &[LifecycleCommand], generation: u64) {
        for cmd in cmds {
            if let LifecycleCommand::Publish(snapshot) = cmd {
                self.publish(snapshot.clone(), generation);
            }
        }
    }

    fn publish(&self, snapshot: LifecycleSnapshot, generation: u64) {
        if !self.is_current(generation) {
            log::trace!("[TRACKER] dropping snapshot from superseded task");
            return;
        }
        self.remember(&snapshot);
        self.snapshots.send_replace(snapshot);
    }

    fn remember(&self, snapshot: &LifecycleSnapshot) {
        let Some(tx_hash) = snapshot.tx_hash.clone() else {
            return;
        };
        let finished = snapshot.state.is_terminal() || snapshot.timed_out;
        let status = format!("{:?}", snapshot.state);

        let result = self.deps.store.update(self.deps.network, |s| {
            if finished {
                s.pending_send = None;
                return;
            }
            match &mut s.pending_send {
                Some(p) if p.tx_hash == tx_hash => p.last_status = status,
                slot => {
                    *slot = Some(PendingSend {
                        tx_hash,
                        submitted_at: unix_now(),
                        last_status: status,
                    })
                }
            }
        });
        if let Err(e) = result {
            log::warn!("[TRACKER] could not persist send state: {:#}", e);
        }
    }

    async fn observe(&self, tx_hash: &str) -> LifecycleEvent {
        match self.observe_inner(tx_hash).await {
            Ok(obs) => LifecycleEvent::StatusObserved(obs),
            Err(e) => LifecycleEvent::QueryFailed {
                error: e.to_string(),
            },
        }
    }

    async fn observe_inner(&self, tx_hash: &str) -> LedgerResult<StatusObservation> {
        let status = self.deps.index.get_transaction(tx_hash).await?.tx_status;

        let confirmations = match (status.status, status.block_hash.as_deref()) {
            (TxStatusKind::Committed, Some(block_hash)) => {
                match self.deps.index.get_header(block_hash).await? {
                    Some(header) => {
                        let tip = self.deps.index.get_tip_header().await?.number;
                        Some(tip.saturating_sub(header.number) + 1)
                    }
                    // Committed but the header is not local yet.
                    None => Some(1),
                }
            }
            (TxStatusKind::Committed, None) => Some(1),
            _ => None,
        };

        log::debug!(
            "[TRACKER] {} status {:?} confirmations {:?}",
            tx_hash,
            status.status,
            confirmations
        );

        Ok(StatusObservation {
            status: status.status,
            confirmations,
            reason: status.reason,
        })
    }

    /// Runs detached from the polling task: cancelling tracking must not
    /// skip the rewind that reveals the change output.
    fn schedule_change_rescan(&self, tx_hash: String) {
        let index = self.deps.index.clone();
        let rescan = self.deps.rescan.clone();
        let delay = self.deps.propagation_delay;
        let depth = self.deps.rescan_depth;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let tip = match index.get_tip_header().await {
                Ok(header) => header.number,
                Err(e) => {
                    log::warn!("[TRACKER] change rescan for {} skipped, no tip: {}", tx_hash, e);
                    return;
                }
            };
            let from = tip.saturating_sub(depth);
            match rescan.rescan(from, RescanReason::PostSubmit).await {
                Ok(outcome) => log::info!(
                    "[TRACKER] change rescan for {} from block {} (applied: {})",
                    tx_hash,
                    outcome.from_block,
                    outcome.applied
                ),
                Err(e) => log::warn!("[TRACKER] change rescan for {} failed: {}", tx_hash, e),
            }
        });
    }

    async fn refresh_balance(&self) {
        if let Err(e) = self
            .deps
            .reconciler
            .reconcile_once(BalanceWriterId::Tracker)
            .await
        {
            log::warn!("[TRACKER] balance refresh after confirmation failed: {}", e);
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
