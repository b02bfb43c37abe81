//! JSON-RPC over HTTP client for a CKB light client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::IndexError;
use crate::ledger::domain::quantity::format_hex_u64;
use crate::ledger::domain::Transaction;
use crate::ledger::index::api::ChainIndexApi;
use crate::ledger::index::types::{
    CellsCapacity, HeaderView, IndexedCell, Order, Pagination, ScriptStatus, SearchKey,
    SetScriptsCommand, TransactionWithStatus, TxStatus, TxWithCell,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct LightClientRpc {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl LightClientRpc {
    pub fn new(url: &str) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IndexError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw call; a JSON `null` result comes back as `Ok(None)`.
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, IndexError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        log::trace!("[RPC] -> {} #{}", method, id);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexError::Transport(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Transport(format!("{}: HTTP {}", method, status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| IndexError::Decode(format!("{}: {}", method, e)))?;

        if let Some(err) = body.error {
            log::debug!("[RPC] <- {} #{} error {}: {}", method, id, err.code, err.message);
            return Err(IndexError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(body.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, IndexError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| IndexError::EmptyResponse(method.to_string()))
    }
}

#[async_trait]
impl ChainIndexApi for LightClientRpc {
    async fn get_tip_header(&self) -> Result<HeaderView, IndexError> {
        self.call("get_tip_header", json!([])).await
    }

    async fn get_header(&self, block_hash: &str) -> Result<Option<HeaderView>, IndexError> {
        self.call_optional("get_header", json!([block_hash])).await
    }

    async fn set_scripts(
        &self,
        scripts: Vec<ScriptStatus>,
        command: SetScriptsCommand,
    ) -> Result<(), IndexError> {
        // Returns null on success.
        self.call_optional::<Value>("set_scripts", json!([scripts, command]))
            .await
            .map(|_| ())
    }

    async fn get_scripts(&self) -> Result<Vec<ScriptStatus>, IndexError> {
        self.call("get_scripts", json!([])).await
    }

    async fn get_cells_capacity(&self, key: SearchKey) -> Result<CellsCapacity, IndexError> {
        self.call("get_cells_capacity", json!([key])).await
    }

    async fn get_cells(
        &self,
        key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<IndexedCell>, IndexError> {
        let limit = format_hex_u64(u64::from(limit));
        self.call("get_cells", json!([key, order, limit, after])).await
    }

    async fn get_transactions(
        &self,
        key: SearchKey,
        order: Order,
        limit: u32,
        after: Option<String>,
    ) -> Result<Pagination<TxWithCell>, IndexError> {
        let limit = format_hex_u64(u64::from(limit));
        self.call("get_transactions", json!([key, order, limit, after]))
            .await
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<String, IndexError> {
        self.call("send_transaction", json!([tx])).await
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<TransactionWithStatus, IndexError> {
        // An index that has never seen the hash may answer null.
        Ok(self
            .call_optional("get_transaction", json!([tx_hash]))
            .await?
            .unwrap_or(TransactionWithStatus {
                tx_status: TxStatus::unknown(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_envelope_decodes_for_any_result_type() {
        let ok: RpcResponse<HeaderView> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{"hash":"0xab","number":"0x64","timestamp":"0x0"}}"#,
        )
        .unwrap();
        assert_eq!(ok.result.map(|h| h.number), Some(100));
        assert!(ok.error.is_none());

        let null: RpcResponse<TransactionWithStatus> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"result":null}"#).unwrap();
        assert!(null.result.is_none());

        let failed: RpcResponse<Vec<ScriptStatus>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        assert!(failed.result.is_none());
        assert_eq!(failed.error.map(|e| e.code), Some(-32601));
    }
}
