//! Event confirmer (C4): promotes `Pending` events to `Confirmed` once the
//! source chain has produced enough confirmations past them. See §4.4.

use std::time::Duration;

use shared_types::{ChainConfig, ConfirmationType, EventStatus};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::ConfirmError;
use crate::source::SourceClient;
use uc_store::SharedChainStore;

/// Default confirmer tick interval.
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(5);

/// Number of oldest-pending events examined per tick.
pub const PENDING_BATCH_SIZE: usize = 1_000;

/// Scans the oldest `Pending` events each tick and promotes those with
/// enough source-chain confirmations to `Confirmed`.
pub struct Confirmer {
    chain: ChainConfig,
    client: std::sync::Arc<SourceClient>,
    store: SharedChainStore,
    interval: Duration,
}

impl Confirmer {
    pub fn new(chain: ChainConfig, client: std::sync::Arc<SourceClient>, store: SharedChainStore, interval: Duration) -> Self {
        Self { chain, client, store, interval }
    }

    fn required_confirmations(&self, confirmation_type: ConfirmationType) -> u64 {
        match confirmation_type {
            ConfirmationType::Instant => 0,
            ConfirmationType::Fast => self.chain.block_confirmation.fast,
            ConfirmationType::Standard => self.chain.block_confirmation.standard,
        }
    }

    /// Extracts the source transaction hash from an event id: the prefix
    /// before the first `:` for external chains, or the whole id for the
    /// home chain (whose ids have no `:` separator).
    fn tx_hash_of(event_id: &str) -> &str {
        event_id.split_once(':').map(|(hash, _)| hash).unwrap_or(event_id)
    }

    /// Runs one confirmation tick, returning the number of events promoted.
    pub async fn confirm_once(&self) -> Result<u64, ConfirmError> {
        let latest = match self.client.latest_block().await {
            Ok(block) => block,
            Err(e) => {
                warn!(chain_id = %self.chain.chain_id, error = %e, "latest-block fetch failed, retrying next tick");
                return Ok(0);
            }
        };

        let pending = self.store.oldest_by_status(EventStatus::Pending, PENDING_BATCH_SIZE)?;
        let mut promoted = 0u64;
        for event in pending {
            let required = self.required_confirmations(event.confirmation_type);
            if required == 0 {
                if self.store.compare_and_swap_status(&event.event_id, EventStatus::Pending, EventStatus::Confirmed)? {
                    promoted += 1;
                }
                continue;
            }

            let tx_hash = Self::tx_hash_of(&event.event_id);
            let receipt = match self.client.get_receipt(tx_hash).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(chain_id = %self.chain.chain_id, event_id = %event.event_id, error = %e, "receipt fetch failed, retrying next tick");
                    continue;
                }
            };
            let Some(receipt) = receipt else { continue };
            let confirmations = latest.saturating_sub(receipt.block_height) + 1;
            if confirmations >= required
                && self.store.compare_and_swap_status(&event.event_id, EventStatus::Pending, EventStatus::Confirmed)?
            {
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.confirm_once().await {
                        Ok(n) if n > 0 => info!(chain_id = %self.chain.chain_id, promoted = n, "confirmer promoted events"),
                        Ok(_) => {}
                        Err(e) => warn!(chain_id = %self.chain.chain_id, error = %e, "confirm tick failed, retrying next tick"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(chain_id = %self.chain.chain_id, "confirmer shutting down");
                        return;
                    }
                }
            }
        }
    }
}
