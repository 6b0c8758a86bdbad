//! The remote chain-config source (§6): `ListChainConfigs()`, fetched every
//! `config_refresh_interval_seconds`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{BlockConfirmation, ChainConfig, ChainId, EnabledFlags, GatewayMethod, VmType};

use crate::error::RegistryError;

/// Wire shape of one entry in the config source's `ListChainConfigs`
/// response, matching §6 field-for-field before being mapped into the
/// domain [`ChainConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainConfigDto {
    chain: String,
    vm_type: VmType,
    gateway_address: String,
    public_rpc_url: String,
    enabled: EnabledFlagsDto,
    block_confirmation: BlockConfirmationDto,
    #[serde(default)]
    gateway_methods: Vec<GatewayMethod>,
    #[serde(default)]
    poll_interval_secs: Option<u64>,
    #[serde(default)]
    cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnabledFlagsDto {
    #[serde(rename = "in")]
    inbound: bool,
    #[serde(rename = "out")]
    outbound: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockConfirmationDto {
    fast: u64,
    standard: u64,
}

impl From<ChainConfigDto> for ChainConfig {
    fn from(dto: ChainConfigDto) -> Self {
        ChainConfig {
            chain_id: ChainId::from(dto.chain),
            vm_type: dto.vm_type,
            gateway_address: dto.gateway_address,
            public_rpc_url: dto.public_rpc_url,
            enabled: EnabledFlags { inbound: dto.enabled.inbound, outbound: dto.enabled.outbound },
            block_confirmation: BlockConfirmation { fast: dto.block_confirmation.fast, standard: dto.block_confirmation.standard },
            gateway_methods: dto.gateway_methods,
            poll_interval_secs: dto.poll_interval_secs,
            cleanup_interval_secs: dto.cleanup_interval_secs,
        }
    }
}

/// Fetches the authoritative chain-config list from the home chain's
/// registry.
#[async_trait]
pub trait ChainConfigSource: Send + Sync {
    async fn list_chain_configs(&self) -> Result<Vec<ChainConfig>, RegistryError>;
}

/// HTTP-backed config source: a single `GET` returning a JSON array of
/// [`ChainConfigDto`] entries.
pub struct HttpChainConfigSource {
    http: reqwest::Client,
    url: String,
}

impl HttpChainConfigSource {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self { http: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().expect("reqwest client"), url }
    }
}

#[async_trait]
impl ChainConfigSource for HttpChainConfigSource {
    async fn list_chain_configs(&self) -> Result<Vec<ChainConfig>, RegistryError> {
        let resp = self.http.get(&self.url).send().await.map_err(|e| RegistryError::ConfigSource(e.to_string()))?;
        let dtos: Vec<ChainConfigDto> = resp.json().await.map_err(|e| RegistryError::ConfigSource(e.to_string()))?;
        Ok(dtos.into_iter().map(ChainConfig::from).collect())
    }
}
