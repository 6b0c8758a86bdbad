//! Gas price oracle (§4.6): the coordinator attaches a destination-chain gas
//! price to the outbound signing request it proposes, so every participant
//! signs over the identical price without each of them re-querying a
//! potentially-divergent external source mid-session.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoordinatorError;
use shared_types::ChainId;

/// Supplies a destination chain's current gas price, as a decimal string
/// (wei/lamports/etc, chain-native units) suitable for embedding verbatim in
/// an [`shared_types::SigningData`].
#[async_trait]
pub trait GasPriceOracle: Send + Sync {
    async fn gas_price(&self, chain_id: &ChainId) -> Result<String, CoordinatorError>;
}

/// An HTTP oracle: `GET {base_url}/{chain_id}` returning a bare numeric
/// string body.
pub struct HttpGasPriceOracle {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGasPriceOracle {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self { http: reqwest::Client::builder().timeout(Duration::from_secs(10)).build().expect("reqwest client"), base_url }
    }
}

#[async_trait]
impl GasPriceOracle for HttpGasPriceOracle {
    async fn gas_price(&self, chain_id: &ChainId) -> Result<String, CoordinatorError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), chain_id.as_str());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CoordinatorError::Oracle { chain_id: chain_id.to_string(), reason: e.to_string() })?;
        resp.text().await.map_err(|e| CoordinatorError::Oracle { chain_id: chain_id.to_string(), reason: e.to_string() })
    }
}

/// A fixed fallback price, used when no live oracle is configured for a
/// chain -- keeps the coordinator able to propose sessions in dev/test
/// environments without a running oracle.
pub struct FixedGasPriceOracle(pub String);

#[async_trait]
impl GasPriceOracle for FixedGasPriceOracle {
    async fn gas_price(&self, _chain_id: &ChainId) -> Result<String, CoordinatorError> {
        Ok(self.0.clone())
    }
}
