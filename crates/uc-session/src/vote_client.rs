//! The home-chain vote surface (§9.1): key-protocol completion routes
//! through a direct `VoteTssKeyProcess` RPC rather than a ballot-tallying
//! layer, per the resolved Open Question.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::SessionError;

/// Submits the result of a completed key-protocol session to the home
/// chain.
#[async_trait]
pub trait HomeChainVoteClient: Send + Sync {
    /// Casts this node's vote that `process_id` completed with the given
    /// public key and keyshare storage id. Returns the home-chain
    /// transaction hash on success.
    async fn vote_tss_key_process(
        &self,
        public_key_hex: &str,
        storage_id: &str,
        process_id: &str,
    ) -> Result<String, SessionError>;
}

/// An ABCI-RPC-backed vote client: a `broadcast_tx_sync`-style JSON-RPC call
/// against the home chain's `public_rpc_url`, the same transport shape the
/// home chain's query client in `uc-chain::source::NativeClient` uses.
pub struct HttpHomeChainVoteClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl HttpHomeChainVoteClient {
    #[must_use]
    pub fn new(rpc_url: String) -> Self {
        Self { http: reqwest::Client::builder().timeout(Duration::from_secs(10)).build().expect("reqwest client"), rpc_url }
    }
}

#[async_trait]
impl HomeChainVoteClient for HttpHomeChainVoteClient {
    async fn vote_tss_key_process(
        &self,
        public_key_hex: &str,
        storage_id: &str,
        process_id: &str,
    ) -> Result<String, SessionError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "vote_tss_key_process",
            "params": { "public_key": public_key_hex, "storage_id": storage_id, "process_id": process_id },
        });
        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::VoteFailed(process_id.to_string(), e.to_string()))?;
        let value: serde_json::Value =
            resp.json().await.map_err(|e| SessionError::VoteFailed(process_id.to_string(), e.to_string()))?;
        if let Some(err) = value.get("error") {
            return Err(SessionError::VoteFailed(process_id.to_string(), err.to_string()));
        }
        Ok(value.pointer("/result/tx_hash").and_then(serde_json::Value::as_str).unwrap_or_default().to_string())
    }
}
