//! The session manager engine (C8): owns every TSS session this node is a
//! participant in, validates the setup/begin/step handshake per §4.6,
//! drives the crypto state machine, and periodically expires sessions that
//! never complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{ChainId, Event, EventStatus, EventType, SessionMessage, SessionMessageKind, SigningData, UnsignedOutbound};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};
use uc_chain::{ChainStores, DestinationClients};
use uc_coordinator::{
    coordinator_for_epoch, eligible_participants, epoch_for_height, select_sign_subset, threshold_for, GasPriceOracle,
    ValidatorSetCache, DEFAULT_COORDINATOR_RANGE,
};
use uc_store::{storage_id_for, KeyshareStore, SharedChainStore};
use uc_transport::PeerTransport;

use crate::crypto::{DklsFactory, DklsSession, ProtocolKind, SessionParams};
use crate::error::SessionError;
use crate::vote_client::HomeChainVoteClient;

/// Default wall-clock lifetime of a session from setup before the expiry
/// checker rewinds it, independent of the event's own `expiry_block_height`
/// (which the coordinator checks before ever sending Setup). Measured in
/// wall-clock seconds rather than a block count since the session manager
/// has no per-chain block-time conversion; recorded as an implementation
/// decision in DESIGN.md.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 120;

/// Default interval between expiry-checker ticks.
pub const DEFAULT_EXPIRY_CHECK_INTERVAL_SECS: u64 = 30;

/// Default number of home-chain blocks a rewound event's `block_height` is
/// bumped by, so the next coordinator scan does not immediately re-elect the
/// same (possibly unreachable) participant set.
pub const DEFAULT_RETRY_DELAY_BLOCKS: u64 = 60;

/// Default tolerance band for the coordinator's proposed gas price against
/// this node's own oracle reading.
pub const DEFAULT_GAS_PRICE_TOLERANCE_PCT: f64 = 0.10;

/// Tunables for one session manager instance, overridable via `USVL_*` env
/// vars at the node-runtime config layer (§7.4).
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub session_ttl: Duration,
    pub expiry_check_interval: Duration,
    pub retry_delay_blocks: u64,
    pub gas_price_tolerance_pct: f64,
    pub coordinator_range: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            expiry_check_interval: Duration::from_secs(DEFAULT_EXPIRY_CHECK_INTERVAL_SECS),
            retry_delay_blocks: DEFAULT_RETRY_DELAY_BLOCKS,
            gas_price_tolerance_pct: DEFAULT_GAS_PRICE_TOLERANCE_PCT,
            coordinator_range: DEFAULT_COORDINATOR_RANGE,
        }
    }
}

/// The signing context recorded at setup time so it can be merged into the
/// event's `signing_data` once the session completes.
struct PendingSign {
    signing_hash_hex: String,
    nonce: u64,
    gas_price: String,
}

/// One running session this node is a participant in.
struct Session {
    dkls: Arc<AsyncMutex<Box<dyn DklsSession>>>,
    protocol_kind: ProtocolKind,
    chain_id: ChainId,
    coordinator: String,
    participants: Vec<String>,
    expiry_time: u64,
    pending_sign: Option<PendingSign>,
}

fn now_unix() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn protocol_kind_for(event_type: EventType) -> ProtocolKind {
    match event_type {
        EventType::Keygen => ProtocolKind::Keygen,
        EventType::Keyrefresh => ProtocolKind::Keyrefresh,
        EventType::QuorumChange => ProtocolKind::QuorumChange,
        EventType::Sign => ProtocolKind::Sign,
    }
}

/// The storage id of the key a Keyrefresh/QuorumChange/Sign event operates
/// on, read from the `current_storage_id` convention the parser (C2) or
/// registry populates in `event_data`. Absent for a QuorumChange admitting a
/// brand-new party, per §4.6.
fn current_storage_id(event: &Event) -> Option<String> {
    event.event_data.get("current_storage_id").and_then(serde_json::Value::as_str).map(String::from)
}

fn within_tolerance(proposed: &str, local: &str, tolerance_pct: f64) -> bool {
    let (Ok(p), Ok(l)) = (proposed.parse::<f64>(), local.parse::<f64>()) else { return false };
    if l == 0.0 {
        return p == 0.0;
    }
    ((p - l).abs() / l) <= tolerance_pct
}

/// The session-manager engine: see the module docs above.
pub struct SessionManager {
    local_operator: String,
    config: SessionManagerConfig,
    chain_stores: Arc<dyn ChainStores>,
    destination_clients: Arc<dyn DestinationClients>,
    validators: Arc<ValidatorSetCache>,
    transport: Arc<dyn PeerTransport>,
    oracle: Arc<dyn GasPriceOracle>,
    keyshare_store: Arc<KeyshareStore>,
    vote_client: Arc<dyn HomeChainVoteClient>,
    dkls_factory: Arc<dyn DklsFactory>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_operator: String,
        config: SessionManagerConfig,
        chain_stores: Arc<dyn ChainStores>,
        destination_clients: Arc<dyn DestinationClients>,
        validators: Arc<ValidatorSetCache>,
        transport: Arc<dyn PeerTransport>,
        oracle: Arc<dyn GasPriceOracle>,
        keyshare_store: Arc<KeyshareStore>,
        vote_client: Arc<dyn HomeChainVoteClient>,
        dkls_factory: Arc<dyn DklsFactory>,
    ) -> Self {
        Self {
            local_operator,
            config,
            chain_stores,
            destination_clients,
            validators,
            transport,
            oracle,
            keyshare_store,
            vote_client,
            dkls_factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn find_event(&self, event_id: &str) -> Result<(SharedChainStore, Event), SessionError> {
        for chain_id in self.chain_stores.chain_ids() {
            if let Some(store) = self.chain_stores.store_for(&chain_id) {
                if let Some(event) = store.get(event_id)? {
                    return Ok((store, event));
                }
            }
        }
        Err(SessionError::EventNotFound(event_id.to_string()))
    }

    fn home_block(&self) -> u64 {
        self.chain_stores
            .store_for(&ChainId::from(ChainId::PUSH))
            .and_then(|s| s.chain_state().ok())
            .map(|s| s.last_block)
            .unwrap_or(0)
    }

    /// Handles an inbound `Setup` message (§4.6). Silently ignores a setup
    /// for a session already known (duplicate coordinator retransmission).
    pub async fn handle_setup(
        &self,
        sender: &str,
        event_id: &str,
        participants: Option<Vec<String>>,
        unsigned_outbound: Option<UnsignedOutbound>,
    ) -> Result<(), SessionError> {
        if self.sessions.read().contains_key(event_id) {
            debug!(event_id, sender, "duplicate setup for known session, ignoring");
            return Ok(());
        }

        let (store, event) = self.find_event(event_id)?;
        let home_block = self.home_block();
        if event.status != EventStatus::Confirmed || event.expiry_block_height <= home_block {
            return Err(SessionError::EventNotConfirmed(event_id.to_string()));
        }

        let active: Vec<String> = self.validators.active().into_iter().map(|v| v.operator_address).collect();
        let epoch = epoch_for_height(home_block, self.config.coordinator_range);
        match coordinator_for_epoch(epoch, &active) {
            Some(leader) if leader == sender => {}
            _ => return Err(SessionError::NotCoordinator { event_id: event_id.to_string(), sender: sender.to_string() }),
        }

        let mut participants = participants.ok_or_else(|| SessionError::ParticipantMismatch(event_id.to_string()))?;
        participants.sort();

        if event.event_type.is_key_protocol() {
            if participants != eligible_participants(&self.validators.eligible()) {
                return Err(SessionError::ParticipantMismatch(event_id.to_string()));
            }
        } else if participants != select_sign_subset(&self.validators.active(), event_id, epoch) {
            return Err(SessionError::ParticipantMismatch(event_id.to_string()));
        }

        let mut pending_sign = None;
        let signing_hash = if event.event_type == EventType::Sign {
            let ob = unsigned_outbound.ok_or_else(|| SessionError::SigningHashMismatch(event_id.to_string()))?;

            let destination = event
                .destination_chain_id()
                .ok_or_else(|| SessionError::EventNotFound(event_id.to_string()))?;
            let client = self
                .destination_clients
                .get_client(&destination)
                .ok_or_else(|| SessionError::EventNotFound(event_id.to_string()))?;

            let local_price = self.oracle.gas_price(&destination).await.map_err(|e| SessionError::Crypto {
                event_id: event_id.to_string(),
                reason: e.to_string(),
            })?;
            if !within_tolerance(&ob.gas_price, &local_price, self.config.gas_price_tolerance_pct) {
                return Err(SessionError::GasPriceOutOfRange {
                    event_id: event_id.to_string(),
                    proposed: ob.gas_price.clone(),
                    local: local_price,
                });
            }

            let finalized = client.get_next_nonce(&self.local_operator, true).await?;
            if ob.nonce < finalized {
                return Err(SessionError::NonceTooLow { event_id: event_id.to_string(), proposed: ob.nonce, finalized });
            }

            let recomputed = client.get_outbound_signing_request(event_id, &event.event_data, &ob.gas_price, ob.nonce)?;
            if recomputed.signing_hash != ob.signing_hash {
                return Err(SessionError::SigningHashMismatch(event_id.to_string()));
            }

            pending_sign = Some(PendingSign {
                signing_hash_hex: ob.signing_hash.clone(),
                nonce: ob.nonce,
                gas_price: ob.gas_price.clone(),
            });

            Some(hex::decode(ob.signing_hash.trim_start_matches("0x")).map_err(|e| SessionError::Crypto {
                event_id: event_id.to_string(),
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        let keyshare = match event.event_type {
            EventType::Keyrefresh | EventType::Sign => {
                let storage_id = current_storage_id(&event).ok_or_else(|| SessionError::Crypto {
                    event_id: event_id.to_string(),
                    reason: "missing current_storage_id".into(),
                })?;
                let bytes = self.keyshare_store.get(&storage_id)?.ok_or_else(|| SessionError::Crypto {
                    event_id: event_id.to_string(),
                    reason: format!("no keyshare stored under {storage_id}"),
                })?;
                Some(bytes)
            }
            EventType::QuorumChange => current_storage_id(&event)
                .map(|id| self.keyshare_store.get(&id))
                .transpose()?
                .flatten(),
            EventType::Keygen => None,
        };

        let params = SessionParams {
            protocol: protocol_kind_for(event.event_type),
            local_party: self.local_operator.clone(),
            participants: participants.clone(),
            threshold: threshold_for(participants.len()),
            keyshare,
            signing_hash,
        };
        let dkls = self.dkls_factory.new_session(params)?;

        {
            let mut sessions = self.sessions.write();
            sessions.insert(
                event_id.to_string(),
                Session {
                    dkls: Arc::new(AsyncMutex::new(dkls)),
                    protocol_kind: protocol_kind_for(event.event_type),
                    chain_id: event.chain_id.clone(),
                    coordinator: sender.to_string(),
                    participants,
                    expiry_time: now_unix() + self.config.session_ttl.as_secs(),
                    pending_sign,
                },
            );
        }

        let claimed = store.compare_and_swap_status(event_id, EventStatus::Confirmed, EventStatus::InProgress)?;
        if !claimed {
            self.sessions.write().remove(event_id);
            return Err(SessionError::EventNotConfirmed(event_id.to_string()));
        }

        info!(event_id, sender, "session opened, sending ack");
        let ack = SessionMessage {
            kind: SessionMessageKind::Ack,
            event_id: event_id.to_string(),
            payload: Vec::new(),
            participants: None,
            unsigned_outbound: None,
        };
        self.transport.send(sender.to_string(), ack).await?;
        Ok(())
    }

    /// Handles an inbound `Begin` message: only the session's own recorded
    /// coordinator may trigger the first step.
    pub async fn handle_begin(&self, sender: &str, event_id: &str) -> Result<(), SessionError> {
        let coordinator = {
            let sessions = self.sessions.read();
            let session =
                sessions.get(event_id).ok_or_else(|| SessionError::UnknownSession(event_id.to_string()))?;
            session.coordinator.clone()
        };
        if sender != coordinator {
            return Err(SessionError::UnauthorizedSender { event_id: event_id.to_string(), sender: sender.to_string() });
        }
        self.step_session(event_id).await
    }

    /// Handles an inbound `Step` message: feeds the payload into the crypto
    /// state machine and advances it one round.
    pub async fn handle_step(&self, sender: &str, event_id: &str, payload: Vec<u8>) -> Result<(), SessionError> {
        let dkls = {
            let sessions = self.sessions.read();
            let session =
                sessions.get(event_id).ok_or_else(|| SessionError::UnknownSession(event_id.to_string()))?;
            if !session.participants.iter().any(|p| p == sender) {
                return Err(SessionError::UnauthorizedSender {
                    event_id: event_id.to_string(),
                    sender: sender.to_string(),
                });
            }
            session.dkls.clone()
        };
        {
            let mut dkls = dkls.lock().await;
            dkls.input_message(sender, &payload)?;
        }
        self.step_session(event_id).await
    }

    async fn step_session(&self, event_id: &str) -> Result<(), SessionError> {
        let dkls = {
            let sessions = self.sessions.read();
            let session =
                sessions.get(event_id).ok_or_else(|| SessionError::UnknownSession(event_id.to_string()))?;
            session.dkls.clone()
        };
        let output = {
            let mut dkls = dkls.lock().await;
            dkls.step()?
        };
        for message in output.outbound {
            let step = SessionMessage {
                kind: SessionMessageKind::Step,
                event_id: event_id.to_string(),
                payload: message.payload,
                participants: None,
                unsigned_outbound: None,
            };
            self.transport.send(message.to_party, step).await?;
        }
        if output.done {
            self.complete_session(event_id).await?;
        }
        Ok(())
    }

    async fn complete_session(&self, event_id: &str) -> Result<(), SessionError> {
        let session = self.sessions.write().remove(event_id);
        let Some(session) = session else { return Ok(()) };

        let result = {
            let mut dkls = session.dkls.lock().await;
            let result = dkls.result();
            dkls.close();
            result
        };
        let Some(result) = result else {
            warn!(event_id, "session reported done but produced no result");
            return Ok(());
        };

        let store = self
            .chain_stores
            .store_for(&session.chain_id)
            .ok_or_else(|| SessionError::EventNotFound(event_id.to_string()))?;

        match session.protocol_kind {
            ProtocolKind::Sign => {
                let pending = session.pending_sign.ok_or_else(|| SessionError::Crypto {
                    event_id: event_id.to_string(),
                    reason: "missing signing context at completion".into(),
                })?;
                let signature = result.signature.ok_or_else(|| SessionError::Crypto {
                    event_id: event_id.to_string(),
                    reason: "no signature produced".into(),
                })?;
                let data = SigningData {
                    signature_hex: hex::encode(signature),
                    signing_hash_hex: pending.signing_hash_hex,
                    nonce: pending.nonce,
                    gas_price: pending.gas_price,
                };
                let updated = store.update(event_id, |e| {
                    if e.status != EventStatus::InProgress {
                        return false;
                    }
                    e.set_signing_data(&data);
                    e.status = EventStatus::Signed;
                    true
                })?;
                if !updated {
                    warn!(event_id, "sign completion raced with a concurrent status change");
                }
            }
            ProtocolKind::Keygen | ProtocolKind::Keyrefresh | ProtocolKind::QuorumChange => {
                let keyshare = result.keyshare.ok_or_else(|| SessionError::Crypto {
                    event_id: event_id.to_string(),
                    reason: "no keyshare produced".into(),
                })?;
                let public_key_hex = result.public_key_hex.unwrap_or_default();
                let storage_id = storage_id_for(event_id);
                self.keyshare_store.put(&storage_id, &keyshare)?;

                match self.vote_client.vote_tss_key_process(&public_key_hex, &storage_id, event_id).await {
                    Ok(tx_hash) => {
                        store.update(event_id, |e| {
                            if e.status != EventStatus::InProgress {
                                return false;
                            }
                            e.status = EventStatus::Completed;
                            e.vote_tx_hash = Some(tx_hash.clone());
                            true
                        })?;
                    }
                    Err(e) => {
                        warn!(event_id, error = %e, "home chain vote failed, reverting event");
                        store.compare_and_swap_status(event_id, EventStatus::InProgress, EventStatus::Reverted)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// One expiry-checker pass: closes and rewinds every session past its
    /// wall-clock TTL back to `Confirmed`, bumping `block_height` so the
    /// next coordinator scan does not immediately re-elect the same
    /// unreachable participant set.
    pub async fn expire_once(&self) {
        let now = now_unix();
        let expired: Vec<(String, ChainId)> = {
            let mut sessions = self.sessions.write();
            let mut out = Vec::new();
            sessions.retain(|event_id, session| {
                if session.expiry_time <= now {
                    out.push((event_id.clone(), session.chain_id.clone()));
                    false
                } else {
                    true
                }
            });
            out
        };
        if expired.is_empty() {
            return;
        }

        let new_height = self.home_block() + self.config.retry_delay_blocks;
        for (event_id, chain_id) in expired {
            let Some(store) = self.chain_stores.store_for(&chain_id) else { continue };
            let rewound = store.update(&event_id, |e| {
                if e.status != EventStatus::InProgress {
                    return false;
                }
                e.status = EventStatus::Confirmed;
                e.block_height = new_height;
                true
            });
            match rewound {
                Ok(true) => info!(event_id, new_height, "session expired, rewound event to confirmed"),
                Ok(false) => debug!(event_id, "session expired but its event already moved on"),
                Err(e) => warn!(event_id, error = %e, "failed to rewind expired session's event"),
            }
        }
    }

    /// Runs the expiry-checker loop until `shutdown` signals true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.expiry_check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.expire_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
