//! Peer transport (C9): signs and authenticates [`PeerEnvelope`]s and carries
//! them between validator nodes. See §6's peer transport contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use shared_types::{PeerEnvelope, SessionMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::directory::PeerDirectory;
use crate::error::TransportError;
use crate::signer::{verify, EnvelopeSigner};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const ENVELOPE_PATH: &str = "/v1/envelope";

/// Sends signed envelopes to other validators, the async trait convention
/// the registry's `ChainConfigSource` and every other collaborator boundary
/// in this daemon use.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Signs and delivers `payload` to `recipient`. Loops back locally,
    /// without a network round trip, when `recipient` is this node.
    async fn send(&self, recipient: String, payload: SessionMessage) -> Result<(), TransportError>;
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

fn signing_bytes(payload: &SessionMessage) -> Vec<u8> {
    serde_json::to_vec(payload).expect("SessionMessage always serializes")
}

/// HTTP-backed [`PeerTransport`]: a `reqwest` sender and an `axum` receiver
/// sharing one nonce-replay cache, built the way the event pipeline's HTTP
/// source clients and the registry's HTTP config source are each a thin
/// wrapper over a `reqwest::Client`.
pub struct HttpPeerTransport {
    local_operator: String,
    signer: EnvelopeSigner,
    directory: Arc<dyn PeerDirectory>,
    http: reqwest::Client,
    inbox_tx: mpsc::Sender<PeerEnvelope>,
    /// `sender -> [(timestamp, nonce), ...]` seen within the last
    /// `PeerEnvelope::MAX_AGE_SECS`, pruned on every accept.
    seen_nonces: Mutex<HashMap<String, Vec<(u64, u64)>>>,
    next_nonce: Mutex<u64>,
}

impl HttpPeerTransport {
    /// Builds a transport for `local_operator`, returning it alongside the
    /// receiver end of its inbox: the caller (node-runtime's wiring layer)
    /// drains this to dispatch Setup/Begin/Step to the session manager and
    /// Ack to the coordinator.
    #[must_use]
    pub fn new(
        local_operator: String,
        signer: EnvelopeSigner,
        directory: Arc<dyn PeerDirectory>,
    ) -> (Arc<Self>, mpsc::Receiver<PeerEnvelope>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(1024);
        let transport = Arc::new(Self {
            local_operator,
            signer,
            directory,
            http: reqwest::Client::builder().timeout(SEND_TIMEOUT).build().expect("reqwest client"),
            inbox_tx,
            seen_nonces: Mutex::new(HashMap::new()),
            next_nonce: Mutex::new(0),
        });
        (transport, inbox_rx)
    }

    /// The axum router exposing this transport's receive endpoint, merged
    /// into the node's operational HTTP surface (§7.5).
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new().route(ENVELOPE_PATH, post(receive_envelope)).with_state(self.clone())
    }

    fn next_nonce(&self) -> u64 {
        let mut guard = self.next_nonce.lock();
        *guard += 1;
        *guard
    }

    /// Validates version, timestamp window, replay, and signature, then
    /// queues the message onto the inbox.
    async fn accept(&self, envelope: PeerEnvelope) -> Result<(), TransportError> {
        if envelope.version != PeerEnvelope::CURRENT_VERSION {
            return Err(TransportError::UnsupportedVersion(envelope.version));
        }

        let now = now_unix();
        let too_new = envelope.timestamp > now + PeerEnvelope::MAX_FUTURE_SKEW_SECS;
        let too_old = now.saturating_sub(envelope.timestamp) > PeerEnvelope::MAX_AGE_SECS;
        if too_new || too_old {
            return Err(TransportError::StaleTimestamp(envelope.timestamp));
        }

        let peer = self.directory.lookup(&envelope.sender).ok_or_else(|| TransportError::UnknownPeer(envelope.sender.clone()))?;
        verify(&peer.public_key_hex, &signing_bytes(&envelope.payload), &envelope.signature)?;

        {
            let mut seen = self.seen_nonces.lock();
            let cutoff = now.saturating_sub(PeerEnvelope::MAX_AGE_SECS);
            let entry = seen.entry(envelope.sender.clone()).or_default();
            entry.retain(|(ts, _)| *ts >= cutoff);
            if entry.iter().any(|(_, n)| *n == envelope.nonce) {
                return Err(TransportError::ReplayedNonce { sender: envelope.sender.clone(), nonce: envelope.nonce });
            }
            entry.push((envelope.timestamp, envelope.nonce));
        }

        debug!(sender = %envelope.sender, kind = ?envelope.payload.kind, "accepted peer envelope");
        self.inbox_tx.send(envelope).await.map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send(&self, recipient: String, payload: SessionMessage) -> Result<(), TransportError> {
        let envelope = PeerEnvelope {
            version: PeerEnvelope::CURRENT_VERSION,
            sender: self.local_operator.clone(),
            recipient: recipient.clone(),
            timestamp: now_unix(),
            nonce: self.next_nonce(),
            signature: self.signer.sign(&signing_bytes(&payload)),
            payload,
        };

        if recipient == self.local_operator {
            return self.accept(envelope).await;
        }

        let peer = self.directory.lookup(&recipient).ok_or_else(|| TransportError::UnroutablePeer(recipient.clone()))?;
        let url = format!("{}{}", peer.address.trim_end_matches('/'), ENVELOPE_PATH);
        self.http
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed { peer: recipient.clone(), reason: e.to_string() })?
            .error_for_status()
            .map_err(|e| TransportError::SendFailed { peer: recipient, reason: e.to_string() })?;
        Ok(())
    }
}

async fn receive_envelope(
    State(transport): State<Arc<HttpPeerTransport>>,
    Json(envelope): Json<PeerEnvelope>,
) -> StatusCode {
    match transport.accept(envelope).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!(error = %e, "rejected inbound peer envelope");
            match e {
                TransportError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_REQUEST,
            }
        }
    }
}
