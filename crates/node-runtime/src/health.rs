//! # Operational HTTP surface (§7.5)
//!
//! `/healthz` reports whether the process itself is alive. `/readyz`
//! additionally checks that the chain registry has at least reconciled
//! once. `/metrics/chains` exposes each running chain's `StatusCounts` as
//! JSON, a plain status snapshot rather than a Prometheus exporter --
//! dashboards scrape this endpoint directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uc_chain::ChainStores;
use uc_registry::ChainRegistry;

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<ChainRegistry>,
    /// Flips true after the registry's first successful reconcile; cheap
    /// readiness signal without polling chain workers individually.
    ready: Arc<std::sync::atomic::AtomicBool>,
}

impl HealthState {
    #[must_use]
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self { registry, ready: Arc::new(std::sync::atomic::AtomicBool::new(false)) }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct ChainMetrics {
    chains: HashMap<String, uc_store::StatusCounts>,
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_chains(State(state): State<HealthState>) -> impl IntoResponse {
    let mut chains = HashMap::new();
    for chain_id in state.registry.chain_ids() {
        let Some(store) = state.registry.store_for(&chain_id) else { continue };
        match store.status_counts() {
            Ok(counts) => {
                chains.insert(chain_id.as_str().to_string(), counts);
            }
            Err(e) => {
                tracing::warn!(chain_id = chain_id.as_str(), error = %e, "failed to read chain status counts");
            }
        }
    }
    Json(ChainMetrics { chains })
}

/// Builds the merged operational router; `node-runtime`'s main loop serves
/// this alongside the peer transport's envelope router on the same port.
#[must_use]
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics/chains", get(metrics_chains))
        .with_state(state)
}
