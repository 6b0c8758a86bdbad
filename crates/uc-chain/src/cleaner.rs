//! Cleaner: the poller/confirmer pair's implicit background companion
//! (§4.2) that prunes terminal events past their retention window.

use std::time::Duration;

use shared_types::ChainId;
use tokio::sync::watch;
use tracing::{info, warn};

use uc_store::SharedChainStore;

/// Default cleaner tick interval.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Default retention window past a terminal transition, in seconds (24h).
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Deletes `Completed`/`Reverted`/`Broadcasted` events once they've sat
/// past the retention window, measured from the wall-clock `terminal_at`
/// timestamp recorded at the terminal transition.
pub struct Cleaner {
    chain_id: ChainId,
    store: SharedChainStore,
    interval: Duration,
    retention_secs: u64,
}

impl Cleaner {
    pub fn new(chain_id: ChainId, store: SharedChainStore, interval: Duration, retention_secs: u64) -> Self {
        Self { chain_id, store, interval, retention_secs }
    }

    fn now_unix() -> u64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    /// Runs one cleanup sweep, returning the number of events deleted.
    pub fn clean_once(&self) -> Result<u64, uc_store::StoreError> {
        let cutoff = Self::now_unix().saturating_sub(self.retention_secs);
        let stale = self.store.terminal_older_than(cutoff)?;
        for event in &stale {
            self.store.delete(&event.event_id)?;
        }
        Ok(stale.len() as u64)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.clean_once() {
                        Ok(n) if n > 0 => info!(chain_id = %self.chain_id, pruned = n, "cleaner pruned terminal events"),
                        Ok(_) => {}
                        Err(e) => warn!(chain_id = %self.chain_id, error = %e, "cleanup sweep failed, retrying next tick"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(chain_id = %self.chain_id, "cleaner shutting down");
                        return;
                    }
                }
            }
        }
    }
}
