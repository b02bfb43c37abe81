use std::time::Duration;

use crate::ledger::builder::FeePolicy;
use crate::ledger::domain::Network;
use crate::ledger::engine::lifecycle::{MAX_POLL_ATTEMPTS, REQUIRED_CONFIRMATIONS};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const PROPAGATION_DELAY: Duration = Duration::from_secs(2);
pub const POST_SUBMIT_RESCAN_DEPTH: u64 = 10;
pub const HISTORY_LIMIT: u32 = 100;
pub const CELL_PAGE_LIMIT: u32 = 100;
pub const MAX_CELL_PAGES: usize = 50;
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Status polling for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
    pub required_confirmations: u64,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
            required_confirmations: REQUIRED_CONFIRMATIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub network: Network,
    pub poll: PollSchedule,
    pub fee: FeePolicy,
    /// Transactions fetched per reconciliation pass, most recent first.
    pub history_limit: u32,
    pub cell_page_limit: u32,
    pub max_cell_pages: usize,
    pub propagation_delay: Duration,
    pub post_submit_rescan_depth: u64,
    pub reconcile_interval: Duration,
    pub ready_timeout: Duration,
}

impl LedgerConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            poll: PollSchedule::default(),
            fee: FeePolicy::default(),
            history_limit: HISTORY_LIMIT,
            cell_page_limit: CELL_PAGE_LIMIT,
            max_cell_pages: MAX_CELL_PAGES,
            propagation_delay: PROPAGATION_DELAY,
            post_submit_rescan_depth: POST_SUBMIT_RESCAN_DEPTH,
            reconcile_interval: RECONCILE_INTERVAL,
            ready_timeout: READY_TIMEOUT,
        }
    }
}
