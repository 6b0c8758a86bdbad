//! Chain registry (C6): the live `{chain id -> running worker}` map, kept in
//! sync with the remotely fetched chain-config list on a fixed interval. See
//! §4.1.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{ChainConfig, ChainId, EnabledFlags, VmType};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uc_chain::{ChainStores, ChainWorker, DestinationClients, SharedSourceClient, WorkerDefaults};
use uc_store::SharedChainStore;

use crate::config_source::ChainConfigSource;
use crate::error::RegistryError;

/// Default interval at which the registry refetches the chain-config list.
pub const DEFAULT_CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The action the reconcile loop takes for one config entry, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileAction {
    /// Config is disabled for both directions, or unchanged from what's running.
    Skip,
    /// Not currently running; start a new worker.
    Add,
    /// Running, but identity fields differ; stop the old worker, start a new one.
    Update,
}

/// Builds the synthetic config for the home Push chain, which the registry
/// ensures is present after every reconcile and never removes.
fn push_chain_config(rpc_url: String) -> ChainConfig {
    ChainConfig {
        chain_id: ChainId::from(ChainId::PUSH),
        vm_type: VmType::Native,
        gateway_address: String::new(),
        public_rpc_url: rpc_url,
        enabled: EnabledFlags { inbound: true, outbound: true },
        block_confirmation: shared_types::BlockConfirmation { fast: 1, standard: 1 },
        gateway_methods: Vec::new(),
        poll_interval_secs: None,
        cleanup_interval_secs: None,
    }
}

/// Maintains the live chain worker set, reconciling it against the remote
/// config source on `config_refresh_interval`. Exclusively owns every
/// [`ChainWorker`] it creates.
pub struct ChainRegistry {
    node_home: PathBuf,
    push_rpc_url: String,
    config_source: Arc<dyn ChainConfigSource>,
    defaults: WorkerDefaults,
    refresh_interval: Duration,
    workers: RwLock<HashMap<ChainId, ChainWorker>>,
    last_seen: RwLock<HashMap<ChainId, ChainConfig>>,
    write_mutex: Mutex<()>,
}

impl ChainRegistry {
    /// Builds a registry rooted at `node_home`, without starting anything --
    /// call [`ChainRegistry::reconcile_once`] or [`ChainRegistry::start`] to
    /// populate it.
    pub fn new(
        node_home: PathBuf,
        push_rpc_url: String,
        config_source: Arc<dyn ChainConfigSource>,
        defaults: WorkerDefaults,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            node_home,
            push_rpc_url,
            config_source,
            defaults,
            refresh_interval,
            workers: RwLock::new(HashMap::new()),
            last_seen: RwLock::new(HashMap::new()),
            write_mutex: Mutex::new(()),
        }
    }

    /// Resolves `USVL_CHAIN_RPC_<CHAIN_ID_UPPER>` for `chain_id`, per §6.
    fn rpc_override_for(chain_id: &ChainId) -> Option<String> {
        let var = format!("USVL_CHAIN_RPC_{}", shared_types::sanitize_chain_id(chain_id.as_str()).to_uppercase());
        std::env::var(var).ok()
    }

    /// A lookup handle any chain's client can be fetched through, without
    /// exposing the registry's write path to callers that only read.
    #[must_use]
    pub fn clients(self: &Arc<Self>) -> Arc<dyn DestinationClients> {
        self.clone()
    }

    /// Current client for `chain_id`, or `None` if no worker is running for it.
    #[must_use]
    pub fn get_client(&self, chain_id: &ChainId) -> Option<SharedSourceClient> {
        self.workers.read().get(chain_id).map(|w| w.client.clone())
    }

    /// Snapshot of every chain id currently running a worker.
    #[must_use]
    pub fn running_chain_ids(&self) -> Vec<ChainId> {
        self.workers.read().keys().cloned().collect()
    }

    fn classify(&self, config: &ChainConfig, running: &HashMap<ChainId, ChainWorker>) -> ReconcileAction {
        if !config.enabled.inbound && !config.enabled.outbound {
            return ReconcileAction::Skip;
        }
        match running.get(&config.chain_id) {
            None => ReconcileAction::Add,
            Some(worker) => {
                if worker.config.reconcile_eq(config) {
                    ReconcileAction::Skip
                } else {
                    ReconcileAction::Update
                }
            }
        }
    }

    /// Starts a worker for `config`, serialized through the write mutex so
    /// Add/Update never race each other; lookups via [`Self::get_client`]
    /// never block on it. On Update, the old worker is fully stopped --
    /// including its RocksDB handle -- before the new one opens the same
    /// on-disk database, so the two never contend for its lock.
    async fn start_worker(&self, config: ChainConfig) -> Result<(), RegistryError> {
        let _guard = self.write_mutex.lock().await;
        if let Some(old) = self.workers.write().remove(&config.chain_id) {
            old.stop().await;
        }
        let rpc_override = Self::rpc_override_for(&config.chain_id);
        let worker = ChainWorker::start(&self.node_home, config.clone(), rpc_override, &self.defaults)?;
        self.workers.write().insert(config.chain_id.clone(), worker);
        self.last_seen.write().insert(config.chain_id.clone(), config);
        Ok(())
    }

    /// Runs one reconcile pass: fetches the remote config list, computes an
    /// action per entry, applies it, then removes workers for chains that
    /// disappeared from the list. The home Push chain is synthesized locally
    /// and ensured present every pass; it is never removed. A failure adding
    /// one chain is logged and does not block the rest (§4.1).
    pub async fn reconcile_once(&self) -> Result<(), RegistryError> {
        let mut configs = self.config_source.list_chain_configs().await?;
        if !configs.iter().any(|c| c.chain_id.is_push()) {
            configs.push(push_chain_config(self.push_rpc_url.clone()));
        }

        let seen_ids: std::collections::HashSet<ChainId> = configs.iter().map(|c| c.chain_id.clone()).collect();

        for config in configs {
            let action = {
                let running = self.workers.read();
                self.classify(&config, &running)
            };
            match action {
                ReconcileAction::Skip => {}
                ReconcileAction::Add => {
                    info!(chain_id = %config.chain_id, "reconcile: adding chain worker");
                    if let Err(e) = self.start_worker(config.clone()).await {
                        warn!(chain_id = %config.chain_id, error = %e, "failed to start chain worker, skipping");
                    }
                }
                ReconcileAction::Update => {
                    info!(chain_id = %config.chain_id, "reconcile: updating chain worker");
                    if let Err(e) = self.start_worker(config.clone()).await {
                        warn!(chain_id = %config.chain_id, error = %e, "failed to restart chain worker, leaving old one running");
                    }
                }
            }
        }

        let stale: Vec<ChainId> = self
            .workers
            .read()
            .keys()
            .filter(|id| !id.is_push() && !seen_ids.contains(id))
            .cloned()
            .collect();
        for chain_id in stale {
            info!(chain_id = %chain_id, "reconcile: removing chain worker");
            let removed = {
                let _guard = self.write_mutex.lock().await;
                let removed = self.workers.write().remove(&chain_id);
                self.last_seen.write().remove(&chain_id);
                removed
            };
            if let Some(worker) = removed {
                worker.stop().await;
            }
        }
        Ok(())
    }

    /// Runs the reconcile loop on `refresh_interval` until `shutdown` signals
    /// true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.reconcile_once().await {
            warn!(error = %e, "initial reconcile failed, retrying on next tick");
        }
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.tick().await; // consume the immediate first tick, we just reconciled above
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        warn!(error = %e, "reconcile failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("registry shutting down");
                        break;
                    }
                }
            }
        }
        let workers: Vec<ChainWorker> = self.workers.write().drain().map(|(_, w)| w).collect();
        for worker in workers {
            worker.stop().await;
        }
    }
}

impl DestinationClients for ChainRegistry {
    fn get_client(&self, chain_id: &ChainId) -> Option<SharedSourceClient> {
        ChainRegistry::get_client(self, chain_id)
    }
}

impl ChainStores for ChainRegistry {
    fn store_for(&self, chain_id: &ChainId) -> Option<SharedChainStore> {
        self.workers.read().get(chain_id).map(|w| w.store.clone())
    }

    fn chain_ids(&self) -> Vec<ChainId> {
        ChainRegistry::running_chain_ids(self)
    }
}
