//! The coordinator engine (C7): elects itself per epoch (§4.5), scans
//! `Confirmed` events across every running chain, and drives the
//! setup/ack/begin handshake that hands each session off to the session
//! manager (C8).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::{ChainId, Event, EventStatus, EventType, SessionMessage, SessionMessageKind};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uc_chain::{ChainStores, DestinationClients};
use uc_transport::PeerTransport;

use crate::epoch::{coordinator_for_epoch, epoch_for_height, DEFAULT_COORDINATOR_RANGE};
use crate::error::CoordinatorError;
use crate::oracle::GasPriceOracle;
use crate::participants::{eligible_participants, select_sign_subset};
use crate::validator_set::ValidatorSetCache;

/// How many `Confirmed` events to pick up per chain per scan tick.
const CONFIRMED_BATCH_SIZE: usize = 100;

/// Default interval between scan ticks.
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Default wall-clock time a `Setup` fan-out may sit waiting for acks before
/// the coordinator considers it stalled, per §4.5's "the new coordinator may
/// re-initiate the session for the same event id after a configured patience
/// window." Kept comfortably above the session manager's own session TTL
/// (120s, `uc_session::DEFAULT_SESSION_TTL_SECS`) so a session that is about
/// to legitimately complete is never raced by a premature retry.
const DEFAULT_PENDING_SETUP_TTL_SECS: u64 = 150;

/// Tunables for one coordinator instance, overridable via `USVL_*` env vars
/// at the node-runtime config layer (§7.4).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub scan_interval: Duration,
    pub coordinator_range: u64,
    pub pending_setup_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            coordinator_range: DEFAULT_COORDINATOR_RANGE,
            pending_setup_ttl: Duration::from_secs(DEFAULT_PENDING_SETUP_TTL_SECS),
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Tracks which participants have acked a session this node set up, so the
/// coordinator knows when to send `Begin`. Also doubles as the skip-check
/// `run_once` uses to avoid resending `Setup` while acks are outstanding --
/// `created_at` bounds how long that skip can last, since nothing ever
/// notifies this map when the session manager's own expiry checker
/// (`uc_session::SessionManager::expire_once`) rewinds the underlying event
/// back to `Confirmed` in a different in-memory component.
struct PendingSession {
    participants: Vec<String>,
    acked: HashSet<String>,
    created_at: u64,
}

/// The session-leader engine: see the module docs above.
pub struct Coordinator {
    local_operator: String,
    config: CoordinatorConfig,
    chain_stores: Arc<dyn ChainStores>,
    destination_clients: Arc<dyn DestinationClients>,
    validators: Arc<ValidatorSetCache>,
    transport: Arc<dyn PeerTransport>,
    oracle: Arc<dyn GasPriceOracle>,
    pending: Mutex<HashMap<String, PendingSession>>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        local_operator: String,
        config: CoordinatorConfig,
        chain_stores: Arc<dyn ChainStores>,
        destination_clients: Arc<dyn DestinationClients>,
        validators: Arc<ValidatorSetCache>,
        transport: Arc<dyn PeerTransport>,
        oracle: Arc<dyn GasPriceOracle>,
    ) -> Self {
        Self {
            local_operator,
            config,
            chain_stores,
            destination_clients,
            validators,
            transport,
            oracle,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Called by the node's transport-dispatch wiring when an `Ack` envelope
    /// arrives. Once every expected participant has acked, sends `Begin` to
    /// the whole participant list, handing the session to each node's
    /// session manager.
    pub async fn handle_ack(&self, sender: &str, event_id: &str) {
        let ready = {
            let mut pending = self.pending.lock();
            let Some(session) = pending.get_mut(event_id) else {
                debug!(event_id, sender, "ack for unknown or already-begun session, ignoring");
                return;
            };
            session.acked.insert(sender.to_string());
            session.acked.len() >= session.participants.len()
        };
        if !ready {
            return;
        }

        let participants = {
            let mut pending = self.pending.lock();
            pending.remove(event_id).map(|s| s.participants).unwrap_or_default()
        };
        info!(event_id, participants = participants.len(), "all participants acked, sending begin");
        for participant in &participants {
            let begin = SessionMessage {
                kind: SessionMessageKind::Begin,
                event_id: event_id.to_string(),
                payload: Vec::new(),
                participants: None,
                unsigned_outbound: None,
            };
            if let Err(e) = self.transport.send(participant.clone(), begin).await {
                warn!(event_id, participant, error = %e, "failed to send begin");
            }
        }
    }

    /// Drops any pending `Setup` fan-out that has sat past
    /// `pending_setup_ttl` without every participant acking. Without this, a
    /// coordinator re-elected for the same event after its own session
    /// expired (§4.5, spec.md scenario 3) would see `run_once`'s skip-check
    /// still hit on its stale `pending` entry and could never retry -- which
    /// the epoch schedule guarantees will happen whenever the same operator
    /// is re-elected, not just in a rare race.
    fn prune_expired_pending(&self) {
        let cutoff = now_unix().saturating_sub(self.config.pending_setup_ttl.as_secs());
        let mut pending = self.pending.lock();
        pending.retain(|event_id, session| {
            let alive = session.created_at > cutoff;
            if !alive {
                debug!(event_id, "pending setup fan-out expired without every ack, clearing for retry");
            }
            alive
        });
    }

    /// One scan pass over every running chain: opens new sessions for any
    /// `Confirmed` event this node is the elected coordinator for. Sessions
    /// that expire without completing are rewound back to `Confirmed` by the
    /// session manager's own expiry checker (C8), which this scan picks up
    /// again on a later tick once the new epoch's coordinator runs.
    pub async fn run_once(&self) {
        self.prune_expired_pending();
        for chain_id in self.chain_stores.chain_ids() {
            let Some(store) = self.chain_stores.store_for(&chain_id) else { continue };

            let height = match store.chain_state() {
                Ok(state) => state.last_block,
                Err(e) => {
                    warn!(%chain_id, error = %e, "failed to read chain watermark, skipping this tick");
                    continue;
                }
            };

            let active: Vec<String> = self.validators.active().into_iter().map(|v| v.operator_address).collect();
            let epoch = epoch_for_height(height, self.config.coordinator_range);
            match coordinator_for_epoch(epoch, &active) {
                Some(leader) if leader == self.local_operator => {}
                _ => continue,
            }

            let confirmed = match store.oldest_by_status(EventStatus::Confirmed, CONFIRMED_BATCH_SIZE) {
                Ok(events) => events,
                Err(e) => {
                    warn!(%chain_id, error = %e, "failed to scan confirmed events");
                    continue;
                }
            };

            for event in confirmed {
                if self.pending.lock().contains_key(&event.event_id) {
                    continue;
                }
                if let Err(e) = self.try_open_session(event, epoch).await {
                    warn!(error = %e, "failed to open session");
                }
            }
        }
    }

    /// Builds the setup payload and fans it out to every selected
    /// participant. Unlike the session manager's own `handle_setup` (§4.6),
    /// this does **not** touch the event's persisted status: that
    /// Confirmed -> InProgress transition is the session manager's to make,
    /// on whichever node's local session manager actually accepts a Setup
    /// -- including this node's own, when the coordinator is itself a
    /// participant. Mutating status here first would make this node reject
    /// its own Setup as already-in-progress. Re-scanning the same event
    /// every tick while acks are outstanding is instead guarded by the
    /// in-memory `pending` map in `run_once`, which is safe because a
    /// duplicate `Setup` for an event with an existing session is a no-op
    /// on every receiving node (§4.6).
    async fn try_open_session(&self, event: Event, epoch: u64) -> Result<(), CoordinatorError> {
        let (participants, unsigned_outbound) = if event.event_type.is_key_protocol() {
            (eligible_participants(&self.validators.eligible()), None)
        } else {
            let destination = event
                .destination_chain_id()
                .ok_or_else(|| CoordinatorError::MissingDestinationChain(event.event_id.clone()))?;
            let client = self
                .destination_clients
                .get_client(&destination)
                .ok_or_else(|| CoordinatorError::NoDestinationClient(destination.to_string()))?;

            let gas_price = self.oracle.gas_price(&destination).await?;
            let nonce = client.get_next_nonce(&self.local_operator, true).await?;
            let signing_request = client.get_outbound_signing_request(&event.event_id, &event.event_data, &gas_price, nonce)?;

            let subset = select_sign_subset(&self.validators.active(), &event.event_id, epoch);
            (
                subset,
                Some(shared_types::UnsignedOutbound {
                    signing_hash: signing_request.signing_hash,
                    nonce: signing_request.nonce,
                    gas_price: signing_request.gas_price,
                }),
            )
        };

        if participants.is_empty() {
            warn!(event_id = %event.event_id, "no eligible participants, event left confirmed for the next scan tick");
            return Ok(());
        }

        self.pending.lock().insert(
            event.event_id.clone(),
            PendingSession { participants: participants.clone(), acked: HashSet::new(), created_at: now_unix() },
        );

        info!(event_id = %event.event_id, participants = participants.len(), "opening session");
        for participant in &participants {
            let setup = SessionMessage {
                kind: SessionMessageKind::Setup,
                event_id: event.event_id.clone(),
                payload: Vec::new(),
                participants: Some(participants.clone()),
                unsigned_outbound: unsigned_outbound.clone(),
            };
            self.transport.send(participant.clone(), setup).await?;
        }
        Ok(())
    }

    /// Runs the scan loop until `shutdown` signals true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
