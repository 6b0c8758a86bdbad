//! Chain worker (C5): composes {poller, confirmer, cleaner} for one chain,
//! each on its own task, all sharing the chain's store and source client.
//! See §4.2 and the concurrency model in §5.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shared_types::{sanitize_chain_id, ChainConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cleaner::{Cleaner, DEFAULT_CLEANUP_INTERVAL, DEFAULT_RETENTION_SECS};
use crate::confirmer::{Confirmer, DEFAULT_CONFIRM_INTERVAL};
use crate::error::PollError;
use crate::poller::{Poller, PollerConfig};
use crate::source::SourceClient;
use uc_store::{ChainStore, SharedChainStore};

/// Defaults shared across chains, overridable per chain via
/// [`ChainConfig::poll_interval_secs`] / `cleanup_interval_secs`.
#[derive(Debug, Clone)]
pub struct WorkerDefaults {
    pub poll_interval: Duration,
    pub confirm_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_secs: u64,
    pub chunk_size: u64,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            confirm_interval: DEFAULT_CONFIRM_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            retention_secs: DEFAULT_RETENTION_SECS,
            chunk_size: 1_000,
        }
    }
}

/// A running worker for one chain: its store, source client, and the
/// poller/confirmer/cleaner tasks draining it. Exclusively owned by the
/// chain registry (C6).
pub struct ChainWorker {
    pub chain_id: shared_types::ChainId,
    pub config: ChainConfig,
    pub store: SharedChainStore,
    pub client: Arc<SourceClient>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ChainWorker {
    /// Opens the chain's database under `<node_home>/databases/<sanitized>.db`,
    /// builds its source client, and spawns the poller/confirmer (when
    /// inbound is enabled) plus the cleaner.
    pub fn start(
        node_home: &Path,
        config: ChainConfig,
        rpc_override: Option<String>,
        defaults: &WorkerDefaults,
    ) -> Result<Self, PollError> {
        let db_path = node_home.join("databases").join(format!("{}.db", sanitize_chain_id(config.chain_id.as_str())));
        std::fs::create_dir_all(db_path.parent().expect("databases dir")).map_err(|e| PollError::Rpc(e.to_string()))?;
        let store: SharedChainStore = Arc::new(ChainStore::open(&db_path)?);
        let client = Arc::new(SourceClient::from_config(&config, rpc_override));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        if config.enabled.inbound {
            let poll_interval = config
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval);
            let poller = Poller::new(
                config.clone(),
                client.clone(),
                store.clone(),
                PollerConfig { chunk_size: defaults.chunk_size, ..PollerConfig::default() }
                    .with_clamped_interval(poll_interval),
            );
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move { poller.run(rx).await }));

            let confirmer = Confirmer::new(config.clone(), client.clone(), store.clone(), defaults.confirm_interval);
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move { confirmer.run(rx).await }));
        }

        let cleanup_interval = config.cleanup_interval_secs.map(Duration::from_secs).unwrap_or(defaults.cleanup_interval);
        let cleaner = Cleaner::new(config.chain_id.clone(), store.clone(), cleanup_interval, defaults.retention_secs);
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { cleaner.run(rx).await }));

        Ok(Self { chain_id: config.chain_id.clone(), config, store, client, shutdown_tx, handles })
    }

    /// Signals every owned task to stop and awaits their completion.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Resolves a chain id to its running store, implemented by the chain
/// registry (C6) and consumed by the coordinator (C7) to scan `Confirmed`
/// events across every chain without depending on the registry crate.
pub trait ChainStores: Send + Sync {
    /// The store for `chain_id`, or `None` if no worker is registered for it.
    fn store_for(&self, chain_id: &shared_types::ChainId) -> Option<SharedChainStore>;
    /// Every chain id currently running a worker.
    fn chain_ids(&self) -> Vec<shared_types::ChainId>;
}
