//! Small JSON file holding the per-network sync watermark and send state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ledger::domain::{Network, SyncMode};

pub const DB_PATH: &str = "ledger_state.json";

/// A broadcast transaction still being followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSend {
    pub tx_hash: String,
    /// Unix seconds.
    pub submitted_at: u64,
    pub last_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLedgerState {
    #[serde(default)]
    pub sync_mode: Option<SyncMode>,
    /// Block the watched script was last registered from.
    #[serde(default)]
    pub registered_from: Option<u64>,
    #[serde(default)]
    pub last_synced_block: u64,
    /// Bumped on every watermark write.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub pending_send: Option<PendingSend>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStateFile {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkLedgerState>,
}

/// Cloneable handle to the state file. Every update is written through.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: Option<PathBuf>,
    inner: Arc<Mutex<LedgerStateFile>>,
}

impl StateStore {
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file: LedgerStateFile = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            log::info!("[STORE] Loaded state from {}", path.display());
            file
        } else {
            log::info!("[STORE] No state at {}, starting fresh", path.display());
            LedgerStateFile::default()
        };

        Ok(Self {
            path: Some(path),
            inner: Arc::new(Mutex::new(file)),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Arc::new(Mutex::new(LedgerStateFile::default())),
        }
    }

    pub fn get(&self, network: Network) -> NetworkLedgerState {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.networks.get(network.name()).cloned().unwrap_or_default()
    }

    /// Applies `f` to the network's state and persists the whole file.
    /// On a write failure the in-memory state is left unchanged.
    pub fn update<F>(&self, network: Network, f: F) -> Result<NetworkLedgerState>
    where
        F: FnOnce(&mut NetworkLedgerState),
    {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let mut next = guard.clone();
        let entry = next.networks.entry(network.name().to_string()).or_default();
        f(entry);
        let updated = entry.clone();

        if let Some(path) = &self.path {
            write_atomic(path, &next)?;
        }
        *guard = next;

        log::debug!("[STORE] {} -> {:?}", network, updated);
        Ok(updated)
    }
}

fn write_atomic(path: &Path, file: &LedgerStateFile) -> Result<()> {
    let json = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ckb-ledger-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);
        let store = StateStore::load_or_create(&path).unwrap();
        assert_eq!(store.get(Network::Testnet), NetworkLedgerState::default());
        assert!(!path.exists());
    }

    #[test]
    fn updates_survive_reload() {
        let path = temp_path("reload");
        let _ = fs::remove_file(&path);

        let store = StateStore::load_or_create(&path).unwrap();
        store
            .update(Network::Mainnet, |s| {
                s.sync_mode = Some(SyncMode::Custom(Some(5_000_000)));
                s.registered_from = Some(5_000_000);
                s.revision += 1;
            })
            .unwrap();

        let reloaded = StateStore::load_or_create(&path).unwrap();
        let state = reloaded.get(Network::Mainnet);
        assert_eq!(state.sync_mode, Some(SyncMode::Custom(Some(5_000_000))));
        assert_eq!(state.registered_from, Some(5_000_000));
        assert_eq!(state.revision, 1);
        assert_eq!(reloaded.get(Network::Testnet), NetworkLedgerState::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn networks_are_kept_apart() {
        let store = StateStore::in_memory();
        store.update(Network::Testnet, |s| s.last_synced_block = 42).unwrap();
        assert_eq!(store.get(Network::Testnet).last_synced_block, 42);
        assert_eq!(store.get(Network::Mainnet).last_synced_block, 0);
    }
}
