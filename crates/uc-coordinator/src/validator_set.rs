//! The Universal Validator set: fetched from the home chain, cached, and used
//! both to elect the epoch coordinator (§4.5) and to keep the peer
//! transport's directory current (the coordinator is the component that
//! learns of new validators first).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uc_transport::{PeerDirectory, PeerInfo};

use crate::error::CoordinatorError;

/// A validator's membership status in the Universal Validator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    /// Fully active: eligible for both key protocols and Sign.
    Active,
    /// Joining: eligible for key protocols (so it receives a share) but not Sign.
    PendingJoin,
    /// Any other status (leaving, jailed, ...): not eligible for anything.
    Other,
}

/// One entry in the Universal Validator set, as fetched from the home chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Operator address (bech32), the stable party id used throughout the
    /// session layer.
    pub operator_address: String,
    /// Current membership status.
    pub status: ValidatorStatus,
    /// Hex-encoded ed25519 public key, for envelope verification.
    pub public_key_hex: String,
    /// Network address the peer transport can reach this validator at.
    pub network_address: String,
}

/// Fetches the current Universal Validator set from the home chain. The
/// concrete home-chain RPC client is out of scope (§1); this is the
/// interface boundary.
#[async_trait]
pub trait ValidatorSetSource: Send + Sync {
    async fn list_validators(&self) -> Result<Vec<ValidatorInfo>, CoordinatorError>;
}

/// An HTTP-backed [`ValidatorSetSource`]: a single `GET` returning a JSON
/// array of [`ValidatorInfo`], mirroring `uc_registry::HttpChainConfigSource`.
pub struct HttpValidatorSetSource {
    http: reqwest::Client,
    url: String,
}

impl HttpValidatorSetSource {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self { http: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().expect("reqwest client"), url }
    }
}

#[async_trait]
impl ValidatorSetSource for HttpValidatorSetSource {
    async fn list_validators(&self) -> Result<Vec<ValidatorInfo>, CoordinatorError> {
        let resp =
            self.http.get(&self.url).send().await.map_err(|e| CoordinatorError::ValidatorSetSource(e.to_string()))?;
        resp.json().await.map_err(|e| CoordinatorError::ValidatorSetSource(e.to_string()))
    }
}

/// A cached snapshot of the Universal Validator set, refreshed on a
/// background ticker and opportunistically when a peer-id lookup fails
/// (§4.5). Ordered by operator address for deterministic epoch election.
pub struct ValidatorSetCache {
    source: Arc<dyn ValidatorSetSource>,
    directory: Arc<dyn PeerDirectory>,
    snapshot: RwLock<Vec<ValidatorInfo>>,
}

impl ValidatorSetCache {
    #[must_use]
    pub fn new(source: Arc<dyn ValidatorSetSource>, directory: Arc<dyn PeerDirectory>) -> Self {
        Self { source, directory, snapshot: RwLock::new(Vec::new()) }
    }

    /// Fetches the latest validator set, sorts it by operator address, and
    /// publishes it both as the local snapshot and into the peer directory
    /// so the transport can reach every validator by operator address.
    pub async fn refresh(&self) -> Result<(), CoordinatorError> {
        let mut validators = self.source.list_validators().await?;
        validators.sort_by(|a, b| a.operator_address.cmp(&b.operator_address));

        let mut entries = HashMap::with_capacity(validators.len());
        for v in &validators {
            entries.insert(
                v.operator_address.clone(),
                PeerInfo { public_key_hex: v.public_key_hex.clone(), address: v.network_address.clone() },
            );
        }
        self.directory.replace(entries);
        *self.snapshot.write() = validators;
        Ok(())
    }

    /// The current snapshot, sorted by operator address. Empty until the
    /// first successful [`Self::refresh`].
    #[must_use]
    pub fn snapshot(&self) -> Vec<ValidatorInfo> {
        self.snapshot.read().clone()
    }

    /// Validators in [`ValidatorStatus::Active`] or [`ValidatorStatus::PendingJoin`],
    /// sorted by operator address -- the eligible set for key protocols and
    /// the draw pool for Sign (§4.5 §1).
    #[must_use]
    pub fn eligible(&self) -> Vec<ValidatorInfo> {
        self.snapshot
            .read()
            .iter()
            .filter(|v| matches!(v.status, ValidatorStatus::Active | ValidatorStatus::PendingJoin))
            .cloned()
            .collect()
    }

    /// Active-only validators, the pool Sign subsets are drawn from.
    #[must_use]
    pub fn active(&self) -> Vec<ValidatorInfo> {
        self.snapshot.read().iter().filter(|v| v.status == ValidatorStatus::Active).cloned().collect()
    }

    /// Runs the background refresh ticker until `shutdown` signals true.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "initial validator set refresh failed, retrying on next tick");
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(error = %e, "validator set refresh failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
