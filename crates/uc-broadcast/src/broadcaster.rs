//! The outbound broadcaster (C10): ticks over every chain's `Signed` events
//! and submits each one's threshold signature to its destination chain, per
//! §4.7. EVM and SVM destinations use different nonce-ordering semantics;
//! the 65→64 byte recovery-byte truncation happens inside
//! `SourceClient::broadcast_outbound_signing_request` itself (§4.7 note),
//! so this module never touches the signature bytes beyond decoding them.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{Event, EventStatus};
use tokio::sync::watch;
use tracing::{info, warn};
use uc_chain::{DestinationClients, SigningRequest, SourceClient};
use uc_store::SharedChainStore;
use uc_chain::ChainStores;

use crate::error::BroadcastError;

/// How many `Signed` events to pick up per chain per tick.
const SIGNED_BATCH_SIZE: usize = 100;

/// Default interval between broadcast ticks.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Tunables for one broadcaster instance, overridable via `USVL_*` env vars
/// at the node-runtime config layer (§7.4).
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub tick_interval: Duration,
    pub batch_size: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self { tick_interval: DEFAULT_TICK_INTERVAL, batch_size: SIGNED_BATCH_SIZE }
    }
}

/// The outbound-broadcast engine: see the module docs above.
pub struct Broadcaster {
    /// The TSS-derived address whose nonce is queried on each destination
    /// chain -- distinct from any single validator's own operator address.
    tss_address: String,
    config: BroadcasterConfig,
    chain_stores: Arc<dyn ChainStores>,
    destination_clients: Arc<dyn DestinationClients>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(
        tss_address: String,
        config: BroadcasterConfig,
        chain_stores: Arc<dyn ChainStores>,
        destination_clients: Arc<dyn DestinationClients>,
    ) -> Self {
        Self { tss_address, config, chain_stores, destination_clients }
    }

    /// One tick: scans every chain's store for `Signed` events and attempts
    /// to broadcast each, oldest first.
    pub async fn run_once(&self) {
        for chain_id in self.chain_stores.chain_ids() {
            let Some(store) = self.chain_stores.store_for(&chain_id) else { continue };
            let signed = match store.oldest_by_status(EventStatus::Signed, self.config.batch_size) {
                Ok(events) => events,
                Err(e) => {
                    warn!(%chain_id, error = %e, "failed to scan signed events");
                    continue;
                }
            };
            for event in signed {
                let event_id = event.event_id.clone();
                if let Err(e) = self.try_broadcast(&store, event).await {
                    warn!(event_id, error = %e, "broadcast attempt failed");
                }
            }
        }
    }

    async fn try_broadcast(&self, store: &SharedChainStore, event: Event) -> Result<(), BroadcastError> {
        let signing_data =
            event.signing_data().ok_or_else(|| BroadcastError::MissingSigningData(event.event_id.clone()))?;
        let destination = event
            .destination_chain_id()
            .ok_or_else(|| BroadcastError::MissingDestinationChain(event.event_id.clone()))?;
        let client = self
            .destination_clients
            .get_client(&destination)
            .ok_or_else(|| BroadcastError::NoDestinationClient(destination.to_string()))?;
        let signature = hex::decode(signing_data.signature_hex.trim_start_matches("0x"))
            .map_err(|e| BroadcastError::InvalidSignature { event_id: event.event_id.clone(), reason: e.to_string() })?;

        let is_evm = matches!(client.as_ref(), SourceClient::Evm(_));
        let req = SigningRequest {
            signing_hash: signing_data.signing_hash_hex.clone(),
            nonce: signing_data.nonce,
            gas_price: signing_data.gas_price.clone(),
        };

        if is_evm {
            match client.get_next_nonce(&self.tss_address, true).await {
                Ok(finalized) if signing_data.nonce < finalized => {
                    return self.mark_broadcasted(store, &event.event_id, None);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "finalized-nonce precheck failed, broadcasting anyway");
                }
            }
        } else {
            let on_chain = client.get_next_nonce(&self.tss_address, false).await?;
            if signing_data.nonce < on_chain {
                return self.mark_broadcasted(store, &event.event_id, None);
            }
            if signing_data.nonce > on_chain {
                return Ok(());
            }
        }

        match client.broadcast_outbound_signing_request(&req, &signature).await {
            Ok(tx_hash) => {
                self.mark_broadcasted(store, &event.event_id, Some(format!("{destination}:{tx_hash}")))
            }
            Err(e) => {
                warn!(event_id = %event.event_id, error = %e, "broadcast failed, re-checking nonce");
                let use_finalized = is_evm;
                match client.get_next_nonce(&self.tss_address, use_finalized).await {
                    Ok(n) if n > signing_data.nonce => self.mark_broadcasted(store, &event.event_id, None),
                    _ => Ok(()),
                }
            }
        }
    }

    fn mark_broadcasted(
        &self,
        store: &SharedChainStore,
        event_id: &str,
        tx_hash: Option<String>,
    ) -> Result<(), BroadcastError> {
        let updated = store.update(event_id, |e| {
            if e.status != EventStatus::Signed {
                return false;
            }
            e.status = EventStatus::Broadcasted;
            e.broadcasted_tx_hash = tx_hash.clone();
            true
        })?;
        if updated {
            info!(event_id, "event broadcasted");
        }
        Ok(())
    }

    /// Runs the broadcast loop until `shutdown` signals true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
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
