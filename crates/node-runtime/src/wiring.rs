//! # Daemon wiring
//!
//! Builds and owns every collaborator (C6-C10 plus the peer transport and
//! the operational HTTP surface) against one [`NodeConfig`], and drives them
//! all concurrently until shutdown is signaled.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uc_broadcast::Broadcaster;
use uc_chain::{ChainStores, WorkerDefaults};
use uc_coordinator::{Coordinator, FixedGasPriceOracle, GasPriceOracle, HttpGasPriceOracle, HttpValidatorSetSource, ValidatorSetCache};
use uc_registry::{ChainRegistry, HttpChainConfigSource};
use uc_session::{HttpHomeChainVoteClient, SessionManager, SimulatedDklsFactory};
use uc_store::KeyshareStore;
use uc_transport::{EnvelopeSigner, HttpPeerTransport, InMemoryPeerDirectory, PeerTransport};

use shared_types::{SessionMessage, SessionMessageKind};

use crate::config::NodeConfig;
use crate::health::{self, HealthState};

/// Owns every long-running subsystem this process drives. Built once by
/// [`Daemon::build`], run to completion by [`Daemon::run`].
pub struct Daemon {
    registry: Arc<ChainRegistry>,
    coordinator: Arc<Coordinator>,
    session_manager: Arc<SessionManager>,
    broadcaster: Arc<Broadcaster>,
    validators: Arc<ValidatorSetCache>,
    transport: Arc<HttpPeerTransport>,
    inbox: mpsc::Receiver<shared_types::PeerEnvelope>,
    health_state: HealthState,
    health_port: u16,
    validator_refresh_interval: std::time::Duration,
}

impl Daemon {
    /// Wires every collaborator together per `config`. Does not start any
    /// background loop or bind any socket -- that happens in [`Daemon::run`].
    pub fn build(config: &NodeConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.node_home)?;

        let directory = Arc::new(InMemoryPeerDirectory::new());
        let signer = EnvelopeSigner::from_seed(config.identity.signing_key_seed);
        let (transport, inbox) = HttpPeerTransport::new(config.identity.operator_address.clone(), signer, directory.clone());

        let config_source = Arc::new(HttpChainConfigSource::new(config.collaborators.chain_config_url.clone()));
        let registry = Arc::new(ChainRegistry::new(
            config.node_home.clone(),
            config.collaborators.push_rpc_url.clone(),
            config_source,
            WorkerDefaults::default(),
            config.registry.config_refresh_interval,
        ));

        let validator_source = Arc::new(HttpValidatorSetSource::new(config.collaborators.validator_set_url.clone()));
        let validators = Arc::new(ValidatorSetCache::new(validator_source, directory));

        let oracle: Arc<dyn GasPriceOracle> = match &config.collaborators.gas_oracle_url {
            Some(url) => Arc::new(HttpGasPriceOracle::new(url.clone())),
            None => {
                warn!("no gas oracle configured, falling back to a fixed dev price");
                Arc::new(FixedGasPriceOracle("1".to_string()))
            }
        };

        let coordinator = Arc::new(Coordinator::new(
            config.identity.operator_address.clone(),
            config.coordinator.clone(),
            registry.clone() as Arc<dyn ChainStores>,
            registry.clients(),
            validators.clone(),
            transport.clone() as Arc<dyn PeerTransport>,
            oracle.clone(),
        ));

        let keyshare_store = Arc::new(KeyshareStore::open(config.node_home.join("keyshares"), &config.keyshare_secret)?);
        let vote_client = Arc::new(HttpHomeChainVoteClient::new(config.collaborators.vote_rpc_url.clone()));
        let dkls_factory = Arc::new(SimulatedDklsFactory);

        let session_manager = Arc::new(SessionManager::new(
            config.identity.operator_address.clone(),
            config.session.clone(),
            registry.clone() as Arc<dyn ChainStores>,
            registry.clients(),
            validators.clone(),
            transport.clone() as Arc<dyn PeerTransport>,
            oracle,
            keyshare_store,
            vote_client,
            dkls_factory,
        ));

        let broadcaster = Arc::new(Broadcaster::new(
            config.identity.operator_address.clone(),
            config.broadcaster.clone(),
            registry.clone() as Arc<dyn ChainStores>,
            registry.clients(),
        ));

        let health_state = HealthState::new(registry.clone());

        Ok(Self {
            registry,
            coordinator,
            session_manager,
            broadcaster,
            validators,
            transport,
            inbox,
            health_state,
            health_port: config.health.port,
            validator_refresh_interval: config.validator_refresh_interval,
        })
    }

    /// Routes one inbound envelope's payload to the collaborator that owns
    /// its message kind: setup/begin/step go to the session manager, acks go
    /// to the coordinator.
    async fn dispatch(coordinator: &Coordinator, session_manager: &SessionManager, sender: String, message: SessionMessage) {
        let result = match message.kind {
            SessionMessageKind::Ack => {
                coordinator.handle_ack(&sender, &message.event_id).await;
                Ok(())
            }
            SessionMessageKind::Setup => {
                session_manager.handle_setup(&sender, &message.event_id, message.participants, message.unsigned_outbound).await
            }
            SessionMessageKind::Begin => session_manager.handle_begin(&sender, &message.event_id).await,
            SessionMessageKind::Step => session_manager.handle_step(&sender, &message.event_id, message.payload).await,
        };
        if let Err(e) = result {
            warn!(sender, event_id = message.event_id, error = %e, "failed to handle inbound session message");
        }
    }

    /// Drives every subsystem concurrently, serves the merged HTTP surface,
    /// and returns once `shutdown` is signaled and every loop has drained.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        if let Err(e) = self.validators.refresh().await {
            warn!(error = %e, "initial validator set refresh failed, retrying on next tick");
        }
        if let Err(e) = self.registry.reconcile_once().await {
            warn!(error = %e, "initial chain registry reconcile failed, retrying on next tick");
        }

        let router: Router = health::router(self.health_state.clone()).merge(self.transport.router());
        let listener = TcpListener::bind(("0.0.0.0", self.health_port)).await?;
        info!(port = self.health_port, "operational and envelope HTTP surface listening");

        let mut server_shutdown = shutdown.clone();
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        });

        let registry = self.registry.clone();
        let registry_shutdown = shutdown.clone();
        let registry_task = tokio::spawn(async move {
            registry.run(registry_shutdown).await;
        });

        let validators = self.validators.clone();
        let validator_refresh_interval = self.validator_refresh_interval;
        let validator_shutdown = shutdown.clone();
        let validator_task = tokio::spawn(async move {
            validators.run(validator_refresh_interval, validator_shutdown).await;
        });

        let coordinator = self.coordinator.clone();
        let coordinator_shutdown = shutdown.clone();
        let coordinator_task = tokio::spawn(async move {
            coordinator.run(coordinator_shutdown).await;
        });

        let session_manager = self.session_manager.clone();
        let session_shutdown = shutdown.clone();
        let session_task = tokio::spawn(async move {
            session_manager.run(session_shutdown).await;
        });

        let broadcaster = self.broadcaster.clone();
        let broadcaster_shutdown = shutdown.clone();
        let broadcaster_task = tokio::spawn(async move {
            broadcaster.run(broadcaster_shutdown).await;
        });

        self.health_state.mark_ready();

        let coordinator = self.coordinator.clone();
        let session_manager = self.session_manager.clone();
        let mut inbox_shutdown = shutdown.clone();
        let mut inbox = self.inbox;
        let inbox_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = inbox_shutdown.changed() => break,
                    envelope = inbox.recv() => {
                        match envelope {
                            Some(envelope) => {
                                Daemon::dispatch(&coordinator, &session_manager, envelope.sender, envelope.payload).await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        if let Err(e) = server.await {
            error!(error = %e, "operational HTTP server exited with an error");
        }

        let _ = tokio::join!(registry_task, validator_task, coordinator_task, session_task, broadcaster_task, inbox_task);
        Ok(())
    }
}
