//! Serialized re-registration of the watched script.
//!
//! A failed re-registration leaves the index registered where it was.
//! Only an explicit registration or resync may move the scan position
//! forward. Repair rescans (desync, post-submit) rewind at most: their
//! target is capped by the index's current progress for the script, so a
//! stale request can never skip blocks a newer one still needs.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::domain::{Network, Script, SyncMode};
use crate::ledger::index::types::{ScriptStatus, SetScriptsCommand};
use crate::ledger::index::SharedIndex;
use crate::ledger::runtime::state::LedgerState;
use crate::persistence::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReason {
    Register(SyncMode),
    Resync(SyncMode),
    Desync,
    PostSubmit,
}

impl RescanReason {
    fn is_explicit(self) -> bool {
        matches!(self, RescanReason::Register(_) | RescanReason::Resync(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanOutcome {
    pub from_block: u64,
    /// False when the index was already at or below the target.
    pub applied: bool,
    pub revision: u64,
}

pub struct RescanCoordinator {
    index: SharedIndex,
    store: StateStore,
    state: Arc<LedgerState>,
    network: Network,
    script: Script,
    lock: Mutex<()>,
}

impl RescanCoordinator {
    pub fn new(
        index: SharedIndex,
        store: StateStore,
        state: Arc<LedgerState>,
        network: Network,
        script: Script,
    ) -> Self {
        Self {
            index,
            store,
            state,
            network,
            script,
            lock: Mutex::new(()),
        }
    }

    /// Current index progress for the watched script, if registered.
    pub async fn script_progress(&self) -> LedgerResult<Option<u64>> {
        let scripts = self.index.get_scripts().await?;
        Ok(scripts
            .into_iter()
            .find(|s| s.script == self.script)
            .map(|s| s.block_number))
    }

    pub async fn rescan(&self, requested_from: u64, reason: RescanReason) -> LedgerResult<RescanOutcome> {
        let _guard = self.lock.lock().await;

        let current = self.script_progress().await?;
        let target = match (reason.is_explicit(), current) {
            (true, _) | (false, None) => requested_from,
            (false, Some(progress)) => requested_from.min(progress),
        };

        if !reason.is_explicit() && current == Some(target) {
            log::debug!(
                "[RESCAN] {:?}: index already at {}, nothing to rewind",
                reason,
                target
            );
            let revision = self.store.get(self.network).revision;
            return Ok(RescanOutcome {
                from_block: target,
                applied: false,
                revision,
            });
        }

        log::info!(
            "[RESCAN] {:?}: registering from block {} (requested {}, index at {:?})",
            reason,
            target,
            requested_from,
            current
        );

        // `partial` overwrites an existing entry's block, so repairs never
        // need the delete; explicit registrations start from a clean entry.
        if reason.is_explicit() {
            self.index
                .set_scripts(
                    vec![ScriptStatus::lock(self.script.clone(), target)],
                    SetScriptsCommand::Delete,
                )
                .await?;
        }
        if let Err(e) = self
            .index
            .set_scripts(
                vec![ScriptStatus::lock(self.script.clone(), target)],
                SetScriptsCommand::Partial,
            )
            .await
        {
            if reason.is_explicit() {
                if let Some(previous) = current {
                    self.restore(previous).await;
                }
            }
            return Err(e.into());
        }

        let persisted = self
            .store
            .update(self.network, |s| {
                s.registered_from = Some(target);
                s.revision += 1;
                if let RescanReason::Register(mode) | RescanReason::Resync(mode) = reason {
                    s.sync_mode = Some(mode);
                }
            })
            .map_err(|e| LedgerError::Store(format!("{:#}", e)))?;

        self.state.update_registration(|r| {
            r.is_registered = true;
            r.registered_from = Some(target);
            r.synced_to_block = target;
            r.revision = persisted.revision;
        });

        Ok(RescanOutcome {
            from_block: target,
            applied: true,
            revision: persisted.revision,
        })
    }

    /// Puts back the registration a failed re-register deleted.
    async fn restore(&self, previous: u64) {
        let result = self
            .index
            .set_scripts(
                vec![ScriptStatus::lock(self.script.clone(), previous)],
                SetScriptsCommand::Partial,
            )
            .await;
        match result {
            Ok(()) => log::warn!("[RESCAN] re-register failed, restored registration at {}", previous),
            Err(e) => log::error!(
                "[RESCAN] re-register failed and registration at {} could not be restored: {}",
                previous,
                e
            ),
        }
    }
}
