//! A minimal JSON-RPC stub standing in for a real EVM/SVM node, so the
//! poller/confirmer/broadcaster can be driven against the actual `reqwest`
//! HTTP clients in `uc-chain::source` rather than a trait mock. Scripted via
//! a shared [`MockRpcState`]; every method the EVM and SVM clients issue
//! (§6) is handled, everything else returns a JSON-RPC error.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Shared, mutable backend state a test script drives across the lifetime
/// of one mock server.
#[derive(Default)]
pub struct MockRpcState {
    pub block_number: Mutex<u64>,
    pub logs: Mutex<Vec<Value>>,
    pub receipts: Mutex<HashMap<String, Value>>,
    /// Values `eth_getTransactionCount` returns, in call order; once only
    /// one remains it is returned for every subsequent call. This is what
    /// lets a test script "nonce advanced between the precheck and the
    /// retry" (§8 scenario 5) without a stateful broadcast-order coupling.
    pub tx_count: Mutex<std::collections::VecDeque<u64>>,
    pub send_raw_tx: Mutex<Option<Result<String, String>>>,
    pub svm_signatures: Mutex<Vec<Value>>,
    pub svm_transactions: Mutex<HashMap<String, Value>>,
    /// Same steady-state-after-exhaustion queue as `tx_count`, for
    /// `getAccountInfo`'s nonce field on the SVM path.
    pub svm_account_nonce: Mutex<std::collections::VecDeque<u64>>,
    pub send_transaction: Mutex<Option<Result<String, String>>>,
    /// Every method name invoked, in call order -- lets a test assert on
    /// the precheck-then-broadcast ordering in §4.7.
    pub calls: Mutex<Vec<String>>,
}

/// A running mock RPC server plus the state driving it.
pub struct MockRpc {
    pub url: String,
    pub state: Arc<MockRpcState>,
}

impl MockRpc {
    /// Binds an ephemeral local port and starts serving `/`. The server task
    /// runs for the lifetime of the test process; there is no explicit stop
    /// since each test binds its own fresh port.
    pub async fn start() -> Self {
        let state = Arc::new(MockRpcState::default());
        let router = Router::new().route("/", post(handle)).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock rpc port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock rpc server");
        });
        Self { url: format!("http://{addr}"), state }
    }
}

async fn handle(State(state): State<Arc<MockRpcState>>, Json(body): Json<Value>) -> Json<Value> {
    let id = body.get("id").cloned().unwrap_or(json!(1));
    let method = body.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
    let params = body.get("params").cloned().unwrap_or(json!([]));
    state.calls.lock().push(method.clone());

    let result = match method.as_str() {
        "eth_blockNumber" => Ok(json!(format!("0x{:x}", *state.block_number.lock()))),
        "eth_getLogs" => Ok(Value::Array(filtered_logs(&state, &params))),
        "eth_getTransactionReceipt" => {
            let tx_hash = params.get(0).and_then(Value::as_str).unwrap_or_default();
            Ok(state.receipts.lock().get(tx_hash).cloned().unwrap_or(Value::Null))
        }
        "eth_getTransactionCount" => Ok(json!(format!("0x{:x}", next_from_queue(&state.tx_count)))),
        "eth_sendRawTransaction" => match state.send_raw_tx.lock().clone() {
            Some(Ok(hash)) => Ok(json!(hash)),
            Some(Err(reason)) => Err(reason),
            None => Err("no send_raw_tx response scripted".to_string()),
        },
        "getSlot" => Ok(json!(*state.block_number.lock())),
        "getSignaturesForAddress" => Ok(Value::Array(state.svm_signatures.lock().clone())),
        "getTransaction" => {
            let signature = params.get(0).and_then(Value::as_str).unwrap_or_default();
            Ok(state.svm_transactions.lock().get(signature).cloned().unwrap_or(Value::Null))
        }
        "getAccountInfo" => {
            let nonce = next_from_queue(&state.svm_account_nonce);
            Ok(json!({ "value": { "data": { "nonce": nonce } } }))
        }
        "sendTransaction" => match state.send_transaction.lock().clone() {
            Some(Ok(sig)) => Ok(json!(sig)),
            Some(Err(reason)) => Err(reason),
            None => Err("no send_transaction response scripted".to_string()),
        },
        other => Err(format!("unhandled method: {other}")),
    };

    Json(match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err(message) => json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32000, "message": message } }),
    })
}

fn filtered_logs(state: &MockRpcState, params: &Value) -> Vec<Value> {
    let filter = params.get(0).cloned().unwrap_or(json!({}));
    let from = filter.get("fromBlock").and_then(Value::as_str).and_then(parse_hex).unwrap_or(0);
    let to = filter.get("toBlock").and_then(Value::as_str).and_then(parse_hex).unwrap_or(u64::MAX);
    state
        .logs
        .lock()
        .iter()
        .filter(|log| {
            let height = log.get("blockNumber").and_then(Value::as_str).and_then(parse_hex).unwrap_or(0);
            height >= from && height <= to
        })
        .cloned()
        .collect()
}

fn next_from_queue(queue: &Mutex<std::collections::VecDeque<u64>>) -> u64 {
    let mut q = queue.lock();
    if q.len() > 1 {
        q.pop_front().unwrap_or(0)
    } else {
        q.front().copied().unwrap_or(0)
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

/// Builds one `eth_getLogs`-shaped log entry for a gateway event.
pub fn evm_log(tx_hash: &str, block: u64, log_index: u64, topic0: &str, data: &str) -> Value {
    json!({
        "transactionHash": tx_hash,
        "blockNumber": format!("0x{block:x}"),
        "logIndex": format!("0x{log_index:x}"),
        "topics": [topic0],
        "data": data,
    })
}

/// Builds one `eth_getTransactionReceipt`-shaped receipt.
pub fn evm_receipt(block: u64, success: bool) -> Value {
    json!({ "blockNumber": format!("0x{block:x}"), "status": if success { "0x1" } else { "0x0" } })
}
