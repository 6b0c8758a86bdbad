//! Source-chain clients (§6) and the outbound-tx-builder interface,
//! dispatched as a tagged variant per chain kind rather than a trait object
//! -- see the design note in §9.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use shared_types::{ChainConfig, VmType};

use crate::error::PollError;

/// A chain-agnostic view of one on-chain transaction's matched events, as
/// produced by a [`SourceClient`]'s polling query.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    /// The source transaction hash (without any CAIP prefix).
    pub tx_hash: String,
    /// Block height the transaction was included in.
    pub block_height: u64,
    /// The matched events within this transaction, in on-chain order.
    pub events: Vec<RawEvent>,
}

/// One matched event within a [`RawTransaction`]. `kind` identifies which
/// recognized event this is (an ABCI event type, or a gateway method name
/// resolved from the chain's configured `gateway_methods`); `attributes` is
/// the attribute/topic/field bag the parser reads from.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Event kind, e.g. `"tss_process_initiated"` or a gateway method name.
    pub kind: String,
    /// String-keyed attribute bag (ABCI attribute, decoded EVM log field, or
    /// decoded SVM instruction log field).
    pub attributes: std::collections::HashMap<String, String>,
    /// Log index within the transaction, for external chains (`None` for the
    /// home chain, whose event id is the process id instead).
    pub log_index: Option<u64>,
}

/// The on-chain confirmation status of a previously observed transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxReceipt {
    /// Block height the transaction was mined in.
    pub block_height: u64,
    /// Whether the transaction succeeded on-chain.
    pub success: bool,
}

/// The signing request a coordinator or session participant computes for a
/// `Sign` event: the canonical hash to be threshold-signed, under a specific
/// nonce and gas price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Canonical signing hash, hex-encoded.
    pub signing_hash: String,
    /// Destination-chain nonce this request was computed under.
    pub nonce: u64,
    /// Gas price this request was computed under, as a decimal string.
    pub gas_price: String,
}

/// HTTP JSON-RPC transport shared by the EVM and home-chain clients.
#[derive(Clone)]
struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    fn new(url: String) -> Self {
        Self { http: reqwest::Client::builder().timeout(Duration::from_secs(10)).build().expect("reqwest client"), url }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, PollError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PollError::Rpc(format!("{method}: {e}")))?;
        let value: Value =
            resp.json().await.map_err(|e| PollError::Rpc(format!("{method} decode: {e}")))?;
        if let Some(err) = value.get("error") {
            return Err(PollError::Rpc(format!("{method} rpc error: {err}")));
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// EVM-family source/destination chain client: `eth_getLogs` /
/// `eth_getTransactionReceipt` / `eth_blockNumber` for polling, plus the
/// nonce/signing-request/broadcast triad for outbound transactions.
pub struct EvmClient {
    rpc: RpcClient,
    gateway_address: String,
    event_identifiers: Vec<String>,
}

impl EvmClient {
    /// Builds a client from a chain config, honoring an RPC URL override.
    pub fn new(config: &ChainConfig, rpc_url_override: Option<String>) -> Self {
        Self {
            rpc: RpcClient::new(rpc_url_override.unwrap_or_else(|| config.public_rpc_url.clone())),
            gateway_address: config.gateway_address.clone(),
            event_identifiers: config.gateway_methods.iter().map(|m| m.event_identifier.clone()).collect(),
        }
    }

    pub async fn latest_block(&self) -> Result<u64, PollError> {
        let result = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&result)
    }

    pub async fn query_events(&self, from: u64, to: u64) -> Result<Vec<RawTransaction>, PollError> {
        let params = json!([{
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": self.gateway_address,
            "topics": [self.event_identifiers],
        }]);
        let logs = self.rpc.call("eth_getLogs", params).await?;
        let logs = logs.as_array().cloned().unwrap_or_default();

        let mut by_tx: std::collections::BTreeMap<String, RawTransaction> = Default::default();
        for log in logs {
            let tx_hash = log.get("transactionHash").and_then(Value::as_str).unwrap_or_default().to_string();
            let block_height = log.get("blockNumber").map(parse_hex_u64).transpose()?.unwrap_or(from);
            let log_index = log.get("logIndex").map(parse_hex_u64).transpose()?;
            let topic0 = log
                .get("topics")
                .and_then(Value::as_array)
                .and_then(|t| t.first())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let mut attributes = std::collections::HashMap::new();
            attributes.insert("data".to_string(), log.get("data").and_then(Value::as_str).unwrap_or_default().to_string());
            attributes.insert("address".to_string(), self.gateway_address.clone());

            let entry = by_tx.entry(tx_hash.clone()).or_insert_with(|| RawTransaction {
                tx_hash: tx_hash.clone(),
                block_height,
                events: Vec::new(),
            });
            entry.events.push(RawEvent { kind: topic0, attributes, log_index });
        }
        Ok(by_tx.into_values().collect())
    }

    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, PollError> {
        let result = self.rpc.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let block_height = result.get("blockNumber").map(parse_hex_u64).transpose()?.unwrap_or(0);
        let success = result.get("status").and_then(Value::as_str).map(|s| s == "0x1").unwrap_or(false);
        Ok(Some(TxReceipt { block_height, success }))
    }

    pub async fn get_next_nonce(&self, addr: &str, use_finalized: bool) -> Result<u64, PollError> {
        let tag = if use_finalized { "finalized" } else { "pending" };
        let result = self.rpc.call("eth_getTransactionCount", json!([addr, tag])).await?;
        parse_hex_u64(&result)
    }

    pub fn get_outbound_signing_request(
        &self,
        event_id: &str,
        event_payload: &Value,
        gas_price: &str,
        nonce: u64,
    ) -> SigningRequest {
        let mut hasher = Keccak256::new();
        hasher.update(event_id.as_bytes());
        hasher.update(self.gateway_address.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(gas_price.as_bytes());
        hasher.update(event_payload.to_string().as_bytes());
        let hash = hasher.finalize();
        SigningRequest { signing_hash: format!("0x{}", hex::encode(hash)), nonce, gas_price: gas_price.to_string() }
    }

    pub async fn broadcast(&self, _req: &SigningRequest, signature: &[u8]) -> Result<String, PollError> {
        let sig = truncate_recovery_byte(signature);
        let raw_tx = format!("0x{}", hex::encode(sig));
        let result = self.rpc.call("eth_sendRawTransaction", json!([raw_tx])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }
}

/// Solana-family source/destination chain client: log/subscription RPCs
/// keyed on the gateway program address.
pub struct SvmClient {
    rpc: RpcClient,
    gateway_program: String,
    event_identifiers: Vec<String>,
}

impl SvmClient {
    pub fn new(config: &ChainConfig, rpc_url_override: Option<String>) -> Self {
        Self {
            rpc: RpcClient::new(rpc_url_override.unwrap_or_else(|| config.public_rpc_url.clone())),
            gateway_program: config.gateway_address.clone(),
            event_identifiers: config.gateway_methods.iter().map(|m| m.event_identifier.clone()).collect(),
        }
    }

    pub async fn latest_block(&self) -> Result<u64, PollError> {
        let result = self.rpc.call("getSlot", json!([{ "commitment": "confirmed" }])).await?;
        result.as_u64().ok_or_else(|| PollError::Rpc("getSlot: non-numeric result".into()))
    }

    pub async fn query_events(&self, from: u64, to: u64) -> Result<Vec<RawTransaction>, PollError> {
        let params = json!([self.gateway_program, { "commitment": "confirmed", "minContextSlot": from }]);
        let signatures = self.rpc.call("getSignaturesForAddress", params).await?;
        let mut txs = Vec::new();
        for entry in signatures.as_array().cloned().unwrap_or_default() {
            let slot = entry.get("slot").and_then(Value::as_u64).unwrap_or(from);
            if slot < from || slot > to {
                continue;
            }
            let signature = entry.get("signature").and_then(Value::as_str).unwrap_or_default().to_string();
            let logs = self.rpc.call("getTransaction", json!([signature, { "commitment": "confirmed" }])).await?;
            let log_lines = logs
                .pointer("/meta/logMessages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut events = Vec::new();
            for (idx, line) in log_lines.iter().enumerate() {
                let line = line.as_str().unwrap_or_default();
                if let Some(tag) = self.event_identifiers.iter().find(|id| line.contains(id.as_str())) {
                    let mut attributes = std::collections::HashMap::new();
                    attributes.insert("log".to_string(), line.to_string());
                    events.push(RawEvent { kind: tag.clone(), attributes, log_index: Some(idx as u64) });
                }
            }
            if !events.is_empty() {
                txs.push(RawTransaction { tx_hash: signature, block_height: slot, events });
            }
        }
        Ok(txs)
    }

    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, PollError> {
        let result = self.rpc.call("getTransaction", json!([tx_hash, { "commitment": "finalized" }])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let block_height = result.get("slot").and_then(Value::as_u64).unwrap_or(0);
        let success = result.pointer("/meta/err").map(Value::is_null).unwrap_or(false);
        Ok(Some(TxReceipt { block_height, success }))
    }

    pub async fn get_next_nonce(&self, addr: &str, _use_finalized: bool) -> Result<u64, PollError> {
        let result = self.rpc.call("getAccountInfo", json!([addr, { "encoding": "base64" }])).await?;
        Ok(result.pointer("/value/data/nonce").and_then(Value::as_u64).unwrap_or(0))
    }

    pub fn get_outbound_signing_request(
        &self,
        event_id: &str,
        event_payload: &Value,
        gas_price: &str,
        nonce: u64,
    ) -> SigningRequest {
        let mut hasher = Keccak256::new();
        hasher.update(event_id.as_bytes());
        hasher.update(self.gateway_program.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(gas_price.as_bytes());
        hasher.update(event_payload.to_string().as_bytes());
        let hash = hasher.finalize();
        SigningRequest { signing_hash: format!("0x{}", hex::encode(hash)), nonce, gas_price: gas_price.to_string() }
    }

    pub async fn broadcast(&self, _req: &SigningRequest, signature: &[u8]) -> Result<String, PollError> {
        let sig = truncate_recovery_byte(signature);
        let result = self.rpc.call("sendTransaction", json!([hex::encode(sig), { "encoding": "hex" }])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }
}

/// The home Push chain client: ABCI query-by-event-predicate for polling,
/// plus (out of scope per §1) the vote-submission surface consumed through
/// the validator-set and config interfaces in `uc-registry`/`uc-coordinator`.
pub struct NativeClient {
    rpc: RpcClient,
}

impl NativeClient {
    pub fn new(rpc_url: String) -> Self {
        Self { rpc: RpcClient::new(rpc_url) }
    }

    pub async fn latest_block(&self) -> Result<u64, PollError> {
        let result = self.rpc.call("block", json!([])).await?;
        result
            .pointer("/block/header/height")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PollError::Rpc("block: missing header.height".into()))
    }

    /// Queries transactions matching an ABCI event predicate, e.g.
    /// `tss_process_initiated.process_id>=0` or `outbound_created.tx_id EXISTS`.
    pub async fn query_events(&self, predicate: &str, from: u64, to: u64) -> Result<Vec<RawTransaction>, PollError> {
        let query = format!("{predicate} AND tx.height>={from} AND tx.height<={to}");
        let result = self.rpc.call("tx_search", json!({ "query": query, "per_page": 1000 })).await?;
        let mut txs = Vec::new();
        for tx in result.get("txs").and_then(Value::as_array).cloned().unwrap_or_default() {
            let tx_hash = tx.get("hash").and_then(Value::as_str).unwrap_or_default().to_string();
            let block_height = tx
                .get("height")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(from);
            let mut events = Vec::new();
            for event in tx.pointer("/tx_result/events").and_then(Value::as_array).cloned().unwrap_or_default() {
                let kind = event.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
                let mut attributes = std::collections::HashMap::new();
                for attr in event.get("attributes").and_then(Value::as_array).cloned().unwrap_or_default() {
                    if let (Some(k), Some(v)) =
                        (attr.get("key").and_then(Value::as_str), attr.get("value").and_then(Value::as_str))
                    {
                        attributes.insert(k.to_string(), v.to_string());
                    }
                }
                events.push(RawEvent { kind, attributes, log_index: None });
            }
            txs.push(RawTransaction { tx_hash, block_height, events });
        }
        Ok(txs)
    }

    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, PollError> {
        let result = self.rpc.call("tx", json!({ "hash": tx_hash })).await?;
        if result.is_null() {
            return Ok(None);
        }
        let block_height = result
            .get("height")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(Some(TxReceipt { block_height, success: true }))
    }
}

/// Truncates a 65-byte Ethereum-style (r,s,v) signature to the 64-byte
/// (r,s) form; signatures already 64 bytes pass through unchanged (§4.7).
#[must_use]
pub fn truncate_recovery_byte(signature: &[u8]) -> Vec<u8> {
    if signature.len() == 65 {
        signature[..64].to_vec()
    } else {
        signature.to_vec()
    }
}

fn parse_hex_u64(value: &Value) -> Result<u64, PollError> {
    let s = value.as_str().ok_or_else(|| PollError::Rpc("expected hex string result".into()))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| PollError::Rpc(e.to_string()))
}

/// The tagged source/destination client variant dispatched by [`crate::worker::ChainWorker`],
/// per the "no virtual calls on the hot path" design note in §9.
pub enum SourceClient {
    /// EVM-compatible chain.
    Evm(EvmClient),
    /// Solana-style chain.
    Svm(SvmClient),
    /// The home Push chain.
    Native(NativeClient),
}

impl SourceClient {
    /// Builds the appropriate variant from a chain config, honoring an RPC
    /// URL override (`USVL_CHAIN_RPC_<CHAIN_ID_UPPER>`).
    pub fn from_config(config: &ChainConfig, rpc_url_override: Option<String>) -> Self {
        match config.vm_type {
            VmType::Evm => SourceClient::Evm(EvmClient::new(config, rpc_url_override)),
            VmType::Svm => SourceClient::Svm(SvmClient::new(config, rpc_url_override)),
            VmType::Native => {
                SourceClient::Native(NativeClient::new(rpc_url_override.unwrap_or_else(|| config.public_rpc_url.clone())))
            }
        }
    }

    pub async fn latest_block(&self) -> Result<u64, PollError> {
        match self {
            SourceClient::Evm(c) => c.latest_block().await,
            SourceClient::Svm(c) => c.latest_block().await,
            SourceClient::Native(c) => c.latest_block().await,
        }
    }

    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, PollError> {
        match self {
            SourceClient::Evm(c) => c.get_receipt(tx_hash).await,
            SourceClient::Svm(c) => c.get_receipt(tx_hash).await,
            SourceClient::Native(c) => c.get_receipt(tx_hash).await,
        }
    }

    /// Outbound nonce lookup; only meaningful for EVM/SVM destination chains.
    pub async fn get_next_nonce(&self, addr: &str, use_finalized: bool) -> Result<u64, PollError> {
        match self {
            SourceClient::Evm(c) => c.get_next_nonce(addr, use_finalized).await,
            SourceClient::Svm(c) => c.get_next_nonce(addr, use_finalized).await,
            SourceClient::Native(_) => Err(PollError::UnsupportedForChainKind("native".into())),
        }
    }

    pub fn get_outbound_signing_request(
        &self,
        event_id: &str,
        event_payload: &Value,
        gas_price: &str,
        nonce: u64,
    ) -> Result<SigningRequest, PollError> {
        match self {
            SourceClient::Evm(c) => Ok(c.get_outbound_signing_request(event_id, event_payload, gas_price, nonce)),
            SourceClient::Svm(c) => Ok(c.get_outbound_signing_request(event_id, event_payload, gas_price, nonce)),
            SourceClient::Native(_) => Err(PollError::UnsupportedForChainKind("native".into())),
        }
    }

    pub async fn broadcast_outbound_signing_request(
        &self,
        req: &SigningRequest,
        signature: &[u8],
    ) -> Result<String, PollError> {
        match self {
            SourceClient::Evm(c) => c.broadcast(req, signature).await,
            SourceClient::Svm(c) => c.broadcast(req, signature).await,
            SourceClient::Native(_) => Err(PollError::UnsupportedForChainKind("native".into())),
        }
    }
}

/// Cheaply shareable across the poller, confirmer, coordinator and
/// broadcaster tasks that all talk to the same chain.
pub type SharedSourceClient = Arc<SourceClient>;

/// Resolves a chain id to its running [`SourceClient`], implemented by the
/// chain registry (C6) and consumed by the coordinator (C7) and broadcaster
/// (C10) without either depending on the registry crate directly -- colocated
/// here with the type it returns, the way `ChainConfigSource` sits next to
/// `ChainConfig` in `uc-registry`.
pub trait DestinationClients: Send + Sync {
    /// Looks up the currently running client for `chain_id`, or `None` if no
    /// worker is registered for it (disabled, unknown, or not yet reconciled).
    fn get_client(&self, chain_id: &shared_types::ChainId) -> Option<SharedSourceClient>;
}
