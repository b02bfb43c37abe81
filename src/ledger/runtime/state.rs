//! Observable ledger state. Readers never block; balance writes go through
//! an exclusive lease.

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::ledger::domain::{Cell, TransactionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceWriterId {
    Reconciler,
    Tracker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub balance: u64,
    pub live_cells: Vec<Cell>,
    pub as_of_block: u64,
    pub written_by: BalanceWriterId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub is_registered: bool,
    pub registered_from: Option<u64>,
    pub synced_to_block: u64,
    pub tip: u64,
    pub revision: u64,
}

pub struct LedgerState {
    balance_tx: Mutex<watch::Sender<Option<BalanceSnapshot>>>,
    balance_rx: watch::Receiver<Option<BalanceSnapshot>>,
    history: watch::Sender<Vec<TransactionRecord>>,
    registration: watch::Sender<RegistrationSnapshot>,
}

/// Exclusive right to publish the balance, held for one reconciliation.
pub struct BalanceWriter<'a> {
    tx: MutexGuard<'a, watch::Sender<Option<BalanceSnapshot>>>,
    who: BalanceWriterId,
}

impl BalanceWriter<'_> {
    /// Publishes unless a snapshot from a later block is already out, in
    /// which case nothing is written and `None` is returned. Equal blocks
    /// replace: the latest pass wins.
    pub fn publish(
        &self,
        balance: u64,
        live_cells: Vec<Cell>,
        as_of_block: u64,
    ) -> Option<BalanceSnapshot> {
        if let Some(current) = self.tx.borrow().as_ref() {
            if current.as_of_block > as_of_block {
                log::debug!(
                    "[RECONCILE] {:?} result as of block {} is older than published block {}",
                    self.who,
                    as_of_block,
                    current.as_of_block
                );
                return None;
            }
        }

        let snapshot = BalanceSnapshot {
            balance,
            live_cells,
            as_of_block,
            written_by: self.who,
        };
        self.tx.send_replace(Some(snapshot.clone()));
        Some(snapshot)
    }

    pub fn current(&self) -> Option<BalanceSnapshot> {
        self.tx.borrow().clone()
    }
}

impl LedgerState {
    pub fn new() -> Self {
        let (balance_tx, balance_rx) = watch::channel(None);
        let (history, _) = watch::channel(Vec::new());
        let (registration, _) = watch::channel(RegistrationSnapshot::default());
        Self {
            balance_tx: Mutex::new(balance_tx),
            balance_rx,
            history,
            registration,
        }
    }

    pub async fn balance_writer(&self, who: BalanceWriterId) -> BalanceWriter<'_> {
        BalanceWriter {
            tx: self.balance_tx.lock().await,
            who,
        }
    }

    pub fn balance(&self) -> Option<BalanceSnapshot> {
        self.balance_rx.borrow().clone()
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<Option<BalanceSnapshot>> {
        self.balance_rx.clone()
    }

    pub fn history(&self) -> Vec<TransactionRecord> {
        self.history.borrow().clone()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Vec<TransactionRecord>> {
        self.history.subscribe()
    }

    pub(crate) fn publish_history(&self, records: Vec<TransactionRecord>) {
        self.history.send_replace(records);
    }

    pub fn registration(&self) -> RegistrationSnapshot {
        self.registration.borrow().clone()
    }

    pub fn subscribe_registration(&self) -> watch::Receiver<RegistrationSnapshot> {
        self.registration.subscribe()
    }

    pub(crate) fn update_registration(&self, f: impl FnOnce(&mut RegistrationSnapshot)) {
        self.registration.send_modify(f);
    }
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new()
    }
}
