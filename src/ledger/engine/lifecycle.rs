//! Confirmation state machine for one submitted transaction.

use serde::{Deserialize, Serialize};

use crate::ledger::index::types::TxStatusKind;

pub const REQUIRED_CONFIRMATIONS: u64 = 3;
pub const MAX_POLL_ATTEMPTS: u32 = 120;

pub const TIMED_OUT_MESSAGE: &str = "tracking timed out, the transaction may still confirm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SendState {
    Idle,
    Sending,
    Pending,
    Proposed,
    /// Committed but below the confirmation threshold.
    Confirming { confirmations: u64 },
    Confirmed { confirmations: u64 },
    Failed { reason: String },
}

impl SendState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SendState::Confirmed { .. } | SendState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub tx_hash: Option<String>,
    pub state: SendState,
    pub message: String,
    pub attempts: u32,
    pub timed_out: bool,
}

impl Default for LifecycleSnapshot {
    fn default() -> Self {
        Self {
            tx_hash: None,
            state: SendState::Idle,
            message: String::new(),
            attempts: 0,
            timed_out: false,
        }
    }
}

/// One status query result, already enriched with a confirmation count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusObservation {
    pub status: TxStatusKind,
    pub confirmations: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    SendStarted,
    Broadcasted { tx_hash: String },
    BroadcastRejected { reason: String },
    /// Follow a transaction submitted elsewhere.
    TrackingStarted { tx_hash: String },
    StatusObserved(StatusObservation),
    QueryFailed { error: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    Publish(LifecycleSnapshot),
    /// Re-register the watched script shortly below the tip so the change
    /// output becomes visible.
    ScheduleChangeRescan { tx_hash: String },
    /// Wait one poll interval, then query status again.
    PollAgain,
    RefreshBalance,
    StopPolling,
}

#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    required_confirmations: u64,
    max_attempts: u32,
    snapshot: LifecycleSnapshot,
    stopped: bool,
}

impl LifecycleMachine {
    pub fn new(required_confirmations: u64, max_attempts: u32) -> Self {
        Self {
            required_confirmations,
            max_attempts,
            snapshot: LifecycleSnapshot::default(),
            stopped: false,
        }
    }

    pub fn snapshot(&self) -> &LifecycleSnapshot {
        &self.snapshot
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) -> Vec<LifecycleCommand> {
        if self.stopped {
            log::trace!("[TRACKER] ignoring {:?} after stop", event);
            return Vec::new();
        }

        match event {
            LifecycleEvent::SendStarted => {
                self.snapshot = LifecycleSnapshot {
                    state: SendState::Sending,
                    message: "broadcasting transaction".to_string(),
                    ..LifecycleSnapshot::default()
                };
                vec![self.publish()]
            }
            LifecycleEvent::Broadcasted { tx_hash } => {
                self.snapshot.tx_hash = Some(tx_hash.clone());
                self.snapshot.state = SendState::Pending;
                self.snapshot.message = "submitted, waiting for inclusion".to_string();
                vec![
                    self.publish(),
                    LifecycleCommand::ScheduleChangeRescan { tx_hash },
                    LifecycleCommand::PollAgain,
                ]
            }
            LifecycleEvent::TrackingStarted { tx_hash } => {
                self.snapshot = LifecycleSnapshot {
                    tx_hash: Some(tx_hash),
                    state: SendState::Pending,
                    message: "tracking transaction".to_string(),
                    ..LifecycleSnapshot::default()
                };
                vec![self.publish(), LifecycleCommand::PollAgain]
            }
            LifecycleEvent::BroadcastRejected { reason } => {
                self.snapshot.message = format!("broadcast rejected: {}", reason);
                self.snapshot.state = SendState::Failed { reason };
                self.stop()
            }
            LifecycleEvent::StatusObserved(obs) => self.on_status(obs),
            LifecycleEvent::QueryFailed { error } => {
                log::warn!("[TRACKER] status query failed: {}", error);
                self.snapshot.attempts += 1;
                self.continue_or_time_out(false)
            }
            LifecycleEvent::Cancelled => {
                self.stopped = true;
                self.snapshot.message = "tracking cancelled".to_string();
                vec![self.publish(), LifecycleCommand::StopPolling]
            }
        }
    }

    fn on_status(&mut self, obs: StatusObservation) -> Vec<LifecycleCommand> {
        self.snapshot.attempts += 1;
        let previous = self.snapshot.state.clone();

        match obs.status {
            // The index may simply not have seen it yet.
            TxStatusKind::Pending | TxStatusKind::Unknown => {
                self.snapshot.state = SendState::Pending;
                self.snapshot.message = "pending".to_string();
            }
            TxStatusKind::Proposed => {
                self.snapshot.state = SendState::Proposed;
                self.snapshot.message = "proposed".to_string();
            }
            TxStatusKind::Committed => {
                let confirmations = obs.confirmations.unwrap_or(1);
                if confirmations >= self.required_confirmations {
                    self.snapshot.state = SendState::Confirmed { confirmations };
                    self.snapshot.message = format!("confirmed ({} confirmations)", confirmations);
                    let mut cmds = self.stop();
                    cmds.insert(1, LifecycleCommand::RefreshBalance);
                    return cmds;
                }
                self.snapshot.state = SendState::Confirming { confirmations };
                self.snapshot.message = format!(
                    "{}/{} confirmations",
                    confirmations, self.required_confirmations
                );
            }
            TxStatusKind::Rejected => {
                let reason = obs
                    .reason
                    .unwrap_or_else(|| "rejected by the network".to_string());
                self.snapshot.message = format!("rejected: {}", reason);
                self.snapshot.state = SendState::Failed { reason };
                return self.stop();
            }
        }

        let changed = previous != self.snapshot.state;
        if changed {
            log::info!(
                "[TRACKER] {} -> {:?}",
                self.snapshot.tx_hash.as_deref().unwrap_or("-"),
                self.snapshot.state
            );
        }
        self.continue_or_time_out(changed)
    }

    fn continue_or_time_out(&mut self, publish: bool) -> Vec<LifecycleCommand> {
        if self.snapshot.attempts >= self.max_attempts {
            self.snapshot.timed_out = true;
            self.snapshot.message = TIMED_OUT_MESSAGE.to_string();
            return self.stop();
        }

        let mut cmds = Vec::with_capacity(2);
        if publish {
            cmds.push(self.publish());
        }
        cmds.push(LifecycleCommand::PollAgain);
        cmds
    }

    fn stop(&mut self) -> Vec<LifecycleCommand> {
        self.stopped = true;
        vec![self.publish(), LifecycleCommand::StopPolling]
    }

    fn publish(&self) -> LifecycleCommand {
        LifecycleCommand::Publish(self.snapshot.clone())
    }
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new(REQUIRED_CONFIRMATIONS, MAX_POLL_ATTEMPTS)
    }
}
