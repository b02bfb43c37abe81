use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::index::ChainIndexApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Starting,
    Ready,
    /// Terminal: the service never came up.
    Failed(String),
}

/// One-shot "service ready" signal shared by every component that talks
/// to the chain index.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<Readiness>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::Starting);
        Self {
            tx: Arc::new(tx),
        }
    }

    pub fn current(&self) -> Readiness {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.tx.subscribe()
    }

    /// Only the first transition out of `Starting` sticks.
    pub fn mark_ready(&self) {
        self.settle(Readiness::Ready);
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.settle(Readiness::Failed(reason.into()));
    }

    fn settle(&self, next: Readiness) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == Readiness::Starting {
                *state = next.clone();
                true
            } else {
                false
            }
        });
        if changed {
            log::info!("[WALLET] chain index readiness: {:?}", next);
        }
    }

    /// Fails fast unless the gate has opened.
    pub fn ensure_ready(&self) -> LedgerResult<()> {
        match self.current() {
            Readiness::Ready => Ok(()),
            Readiness::Starting => Err(LedgerError::ResourceUnavailable(
                "chain index service is not ready".to_string(),
            )),
            Readiness::Failed(reason) => Err(LedgerError::ResourceUnavailable(format!(
                "chain index service failed to start: {}",
                reason
            ))),
        }
    }

    /// Waits for the gate to settle, up to `timeout`.
    pub async fn wait_ready(&self, timeout: Duration) -> LedgerResult<()> {
        let mut rx = self.subscribe();
        let settled = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| *s != Readiness::Starting).await.map(|_| ())
        })
        .await;

        match settled {
            Ok(Ok(_)) => self.ensure_ready(),
            Ok(Err(_)) => Err(LedgerError::ResourceUnavailable(
                "readiness signal dropped".to_string(),
            )),
            Err(_) => Err(LedgerError::ResourceUnavailable(format!(
                "chain index not ready after {:?}",
                timeout
            ))),
        }
    }

    /// Opens the gate once the index answers a tip query.
    pub async fn probe(&self, index: &dyn ChainIndexApi) -> LedgerResult<u64> {
        match index.get_tip_header().await {
            Ok(header) => {
                self.mark_ready();
                Ok(header.number)
            }
            Err(e) => {
                log::warn!("[WALLET] readiness probe failed: {}", e);
                Err(LedgerError::Index(e))
            }
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
