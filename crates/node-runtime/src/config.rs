//! # Node configuration
//!
//! One `NodeConfig` composed of per-component sub-configs, mirroring the
//! wider `container::config::NodeConfig` shape used across the validator's
//! other process configs: every sub-config carries its own documented
//! defaults, each overridable by an environment variable read once at
//! process start (§7.4). Unset variables leave the default in place;
//! malformed values are treated as absent and logged as a warning rather
//! than failing startup -- except the two secrets below, which have no
//! safe default and are a Fatal condition per §7.2/§7.4.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use uc_broadcast::BroadcasterConfig;
use uc_coordinator::{CoordinatorConfig, DEFAULT_COORDINATOR_RANGE};
use uc_registry::DEFAULT_CONFIG_REFRESH_INTERVAL;
use uc_session::SessionManagerConfig;

/// Default bind port for the operational HTTP surface (§7.5).
pub const DEFAULT_HEALTH_PORT: u16 = 9100;

/// Default interval at which the validator-set cache refreshes itself.
pub const DEFAULT_VALIDATOR_REFRESH_SECS: u64 = 30;

/// Fatal at startup: a secret this node has no safe default for is missing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set and has no safe default")]
    MissingSecret(&'static str),
    #[error("{0} is not a valid 32-byte hex seed")]
    BadSigningSeed(&'static str),
}

/// This validator's identity within the cohort: its operator address (the
/// party id used throughout the session layer) and the ed25519 seed its
/// envelope signer is derived from. Neither has a safe default -- unlike the
/// tunables below, a wrong guess here is a Fatal misconfiguration, not a
/// recoverable default.
#[derive(Debug, Clone)]
pub struct OperatorIdentity {
    pub operator_address: String,
    pub signing_key_seed: [u8; 32],
}

/// Endpoints for the external collaborators named in §6: the home chain's
/// config/validator-set registries, the gas oracle, and the vote RPC. Their
/// internals are out of scope (§1); this is the interface boundary the
/// `Http*` adapters in each crate are built from.
#[derive(Debug, Clone)]
pub struct CollaboratorEndpoints {
    /// Home Push chain RPC URL, also used as the default vote-RPC endpoint.
    pub push_rpc_url: String,
    /// `ListChainConfigs` endpoint (§6).
    pub chain_config_url: String,
    /// Universal Validator set endpoint (§4.5).
    pub validator_set_url: String,
    /// Gas price oracle base URL; `None` falls back to a fixed dev price.
    pub gas_oracle_url: Option<String>,
    /// `VoteTssKeyProcess` RPC endpoint; defaults to `push_rpc_url`.
    pub vote_rpc_url: String,
}

/// Chain registry (C6) tunables.
#[derive(Debug, Clone)]
pub struct RegistryTuning {
    pub config_refresh_interval: Duration,
}

impl Default for RegistryTuning {
    fn default() -> Self {
        Self { config_refresh_interval: DEFAULT_CONFIG_REFRESH_INTERVAL }
    }
}

/// Operational HTTP surface (§7.5) tunables.
#[derive(Debug, Clone, Copy)]
pub struct HealthTuning {
    pub port: u16,
}

impl Default for HealthTuning {
    fn default() -> Self {
        Self { port: DEFAULT_HEALTH_PORT }
    }
}

/// Complete node configuration: identity, storage root, collaborator
/// endpoints, and every component's tunables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_home: PathBuf,
    pub identity: OperatorIdentity,
    pub collaborators: CollaboratorEndpoints,
    pub registry: RegistryTuning,
    pub coordinator: CoordinatorConfig,
    pub session: SessionManagerConfig,
    pub broadcaster: BroadcasterConfig,
    pub health: HealthTuning,
    pub validator_refresh_interval: Duration,
    /// Process-level symmetric secret the keyshare store encrypts with.
    pub keyshare_secret: Vec<u8>,
}

fn env_string(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        Ok(_) => None,
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => {
            warn!(name, "environment variable is not valid UTF-8, ignoring");
            None
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env_string(name)?;
    match raw.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = raw, "environment variable is not a valid integer, ignoring");
            None
        }
    }
}

fn env_u16(name: &str) -> Option<u16> {
    let raw = env_string(name)?;
    match raw.parse::<u16>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = raw, "environment variable is not a valid port, ignoring");
            None
        }
    }
}

impl NodeConfig {
    /// Reads every `USVL_*` override once at process start, per §7.4.
    /// Fatal if `USVL_KEYSHARE_SECRET`, `USVL_OPERATOR_ADDRESS`, or
    /// `USVL_SIGNING_KEY_SEED` are missing or malformed -- this node has no
    /// identity or at-rest encryption key without them.
    pub fn load() -> Result<Self, ConfigError> {
        let node_home = env_string("USVL_NODE_HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./universal-client"));

        let keyshare_secret = env_string("USVL_KEYSHARE_SECRET")
            .ok_or(ConfigError::MissingSecret("USVL_KEYSHARE_SECRET"))?
            .into_bytes();

        let operator_address =
            env_string("USVL_OPERATOR_ADDRESS").ok_or(ConfigError::MissingSecret("USVL_OPERATOR_ADDRESS"))?;

        let seed_hex =
            env_string("USVL_SIGNING_KEY_SEED").ok_or(ConfigError::MissingSecret("USVL_SIGNING_KEY_SEED"))?;
        let seed_bytes = hex::decode(seed_hex.trim_start_matches("0x"))
            .map_err(|_| ConfigError::BadSigningSeed("USVL_SIGNING_KEY_SEED"))?;
        let signing_key_seed: [u8; 32] =
            seed_bytes.try_into().map_err(|_| ConfigError::BadSigningSeed("USVL_SIGNING_KEY_SEED"))?;

        let push_rpc_url = env_string("USVL_PUSH_RPC_URL").unwrap_or_else(|| "http://localhost:26657".to_string());
        let vote_rpc_url = env_string("USVL_VOTE_RPC_URL").unwrap_or_else(|| push_rpc_url.clone());
        let chain_config_url =
            env_string("USVL_CHAIN_CONFIG_URL").unwrap_or_else(|| format!("{push_rpc_url}/chain_configs"));
        let validator_set_url =
            env_string("USVL_VALIDATOR_SET_URL").unwrap_or_else(|| format!("{push_rpc_url}/validators"));
        let gas_oracle_url = env_string("USVL_GAS_ORACLE_URL");

        let registry = RegistryTuning {
            config_refresh_interval: env_u64("USVL_CONFIG_REFRESH_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONFIG_REFRESH_INTERVAL),
        };

        let coordinator = CoordinatorConfig {
            coordinator_range: env_u64("USVL_COORDINATOR_RANGE").unwrap_or(DEFAULT_COORDINATOR_RANGE),
            ..CoordinatorConfig::default()
        };

        let session = SessionManagerConfig { coordinator_range: coordinator.coordinator_range, ..SessionManagerConfig::default() };

        let health = HealthTuning { port: env_u16("USVL_HEALTH_PORT").unwrap_or(DEFAULT_HEALTH_PORT) };

        Ok(Self {
            node_home,
            identity: OperatorIdentity { operator_address, signing_key_seed },
            collaborators: CollaboratorEndpoints { push_rpc_url, chain_config_url, validator_set_url, gas_oracle_url, vote_rpc_url },
            registry,
            coordinator,
            session,
            broadcaster: BroadcasterConfig::default(),
            health,
            validator_refresh_interval: Duration::from_secs(DEFAULT_VALIDATOR_REFRESH_SECS),
            keyshare_secret,
        })
    }
}
