use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where indexing of the watched script should start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "height", rename_all = "snake_case")]
pub enum SyncMode {
    /// Nothing to recover: start at the tip.
    NewWallet,
    /// Roughly the last month of blocks.
    #[default]
    Recent,
    FullHistory,
    Custom(Option<u64>),
}

impl SyncMode {
    /// Builds a mode from a CLI style name plus an optional height.
    pub fn from_parts(name: &str, height: Option<u64>) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "new" | "new_wallet" | "tip" => Ok(SyncMode::NewWallet),
            "recent" => Ok(SyncMode::Recent),
            "full" | "full_history" | "genesis" => Ok(SyncMode::FullHistory),
            "custom" => Ok(SyncMode::Custom(height)),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_parts(s, None)
    }
}
