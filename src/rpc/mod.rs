//! JSON-RPC client for the external ledger node
//!
//! Carries every remote interaction Gavel makes: the append-only log query,
//! read-only authority calls, and transaction submission through a
//! node-managed account. One HTTP client, one endpoint, request ids handed
//! out from an atomic counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use primitive_types::{H160, H256, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::types::{GavelError, Result};

/// How often a pending transaction receipt is re-polled
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One raw append-only event record as returned by the ledger
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: H160,
    pub topics: Vec<H256>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub block_number: U256,
}

/// Receipt for an included transaction
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(default)]
    pub status: Option<U256>,
    #[serde(default)]
    pub block_number: U256,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

impl TransactionReceipt {
    /// Pre-Byzantium nodes omit status; treat absence as success.
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| !s.is_zero()).unwrap_or(true)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client for a single ledger endpoint
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("gavel/0.1")
            .build()
            .map_err(GavelError::Transport)?;

        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC request and deserialize its `result`
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "rpc request");
        let response = self.http.post(&self.url).json(&body).send().await?;
        let parsed: RpcResponse = response.json().await?;

        if let Some(err) = parsed.error {
            return Err(GavelError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        serde_json::from_value(parsed.result)
            .map_err(|e| GavelError::Response(format!("{method}: {e}")))
    }

    /// Current ledger head height
    pub async fn block_number(&self) -> Result<u64> {
        let height: U256 = self.request("eth_blockNumber", json!([])).await?;
        Ok(height.as_u64())
    }

    /// Accounts the node manages and can sign for
    pub async fn accounts(&self) -> Result<Vec<H160>> {
        self.request("eth_accounts", json!([])).await
    }

    /// Fetch raw event records for one contract and topic over
    /// `[from_block, latest]`. This is the cycle's single log-range query;
    /// its failure aborts the whole cycle.
    pub async fn get_logs(
        &self,
        address: H160,
        topic0: H256,
        from_block: u64,
    ) -> Result<Vec<RawLog>> {
        let filter = json!([{
            "address": address,
            "topics": [topic0],
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": "latest",
        }]);
        self.request("eth_getLogs", filter).await
    }

    /// Read-only contract call against latest state
    pub async fn call(&self, to: H160, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            "latest",
        ]);
        let output: String = self.request("eth_call", params).await?;
        decode_hex(&output)
    }

    /// Submit a transaction signed by a node-managed account
    pub async fn send_transaction(&self, from: H160, to: H160, data: &[u8]) -> Result<H256> {
        let params = json!([{
            "from": from,
            "to": to,
            "data": format!("0x{}", hex::encode(data)),
        }]);
        self.request("eth_sendTransaction", params).await
    }

    /// Poll until a transaction is included, then check it did not revert
    pub async fn wait_for_receipt(
        &self,
        tx: H256,
        timeout: Duration,
    ) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + timeout;
        loop {
            let receipt: Option<TransactionReceipt> = self
                .request("eth_getTransactionReceipt", json!([tx]))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.succeeded() {
                    return Ok(receipt);
                }
                return Err(GavelError::Reverted(tx));
            }

            if Instant::now() >= deadline {
                return Err(GavelError::InclusionTimeout(tx));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Parse a 0x-prefixed hex string into bytes
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| GavelError::Response(format!("invalid hex {value:?}: {e}")))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let stripped = text.strip_prefix("0x").unwrap_or(&text);
        hex::decode(stripped).map_err(serde::de::Error::custom)
    }
}
