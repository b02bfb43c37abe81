//! Maps a sync strategy and the current tip to the block the index should
//! start scanning from.

use crate::ledger::domain::{Network, SyncMode};

/// Blocks covered by [`SyncMode::Recent`], about a month of mainnet blocks.
pub const RECENT_WINDOW: u64 = 200_000;

/// Raw strategy mapping. `tip == 0` means the tip is unknown.
pub fn resolve_start_block(mode: SyncMode, tip: u64, checkpoint: u64) -> u64 {
    match mode {
        SyncMode::NewWallet => {
            if tip > 0 {
                tip
            } else {
                checkpoint
            }
        }
        SyncMode::Recent => {
            let best_tip = if tip > 0 { tip } else { checkpoint };
            best_tip.saturating_sub(RECENT_WINDOW)
        }
        SyncMode::FullHistory => 0,
        SyncMode::Custom(height) => height.unwrap_or(0),
    }
}

/// Guards a resolved block against a future height and an accidental
/// genesis scan.
pub fn apply_safety(resolved: u64, mode: SyncMode, tip: u64, checkpoint: u64) -> u64 {
    let mut block = resolved;

    if tip > 0 && block > tip {
        log::warn!(
            "[RESCAN] start block {} is beyond tip {}, clamping to recent window",
            block,
            tip
        );
        block = tip.saturating_sub(RECENT_WINDOW);
    }

    if block == 0 && mode != SyncMode::FullHistory {
        block = checkpoint;
    }

    // The checkpoint itself may be ahead of a young chain.
    if tip > 0 {
        block = block.min(tip);
    }

    block
}

#[derive(Debug, Clone, Copy)]
pub struct SyncCheckpointResolver {
    checkpoint: u64,
}

impl SyncCheckpointResolver {
    pub fn new(checkpoint: u64) -> Self {
        Self { checkpoint }
    }

    pub fn for_network(network: Network) -> Self {
        Self::new(network.checkpoint())
    }

    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    /// Resolution followed by the safety pass; what registration uses.
    pub fn resolve(&self, mode: SyncMode, tip: u64) -> u64 {
        let raw = resolve_start_block(mode, tip, self.checkpoint);
        let safe = apply_safety(raw, mode, tip, self.checkpoint);
        log::debug!(
            "[RESCAN] resolved {:?} at tip {} -> {} (raw {})",
            mode,
            tip,
            safe,
            raw
        );
        safe
    }
}
