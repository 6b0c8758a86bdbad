//! Event poller (C3): tails a source chain in block-chunked ranges, parses
//! each chunk's matched transactions, and persists new events through
//! `InsertIfNotExists`. See §4.3.

use std::time::Duration;

use shared_types::ChainConfig;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::PollError;
use crate::parser::parse_transaction;
use crate::source::{RawTransaction, SourceClient};
use uc_store::SharedChainStore;

/// The two fixed ABCI event predicates the home chain poller queries (§4.3,
/// §6) -- not configurable, since they're protocol constants rather than
/// per-chain gateway methods.
const NATIVE_PREDICATES: [&str; 2] = ["tss_process_initiated.process_id>=0", "outbound_created.tx_id EXISTS"];

/// Lower/upper bounds on the configurable poll interval (§4.3).
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Where a poller starts on first run, when no watermark is persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStartFrom {
    /// Start from a specific block height.
    Block(u64),
    /// Start from whatever the source reports as its latest block.
    Latest,
}

/// Per-chain poller configuration, clamped to the documented bounds.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub chunk_size: u64,
    pub start_from: EventStartFrom,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), chunk_size: 1_000, start_from: EventStartFrom::Block(0) }
    }
}

impl PollerConfig {
    /// Clamps `poll_interval` into `[MIN_POLL_INTERVAL, MAX_POLL_INTERVAL]`.
    #[must_use]
    pub fn with_clamped_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }
}

/// Tails one chain and persists newly observed events.
pub struct Poller {
    chain: ChainConfig,
    client: std::sync::Arc<SourceClient>,
    store: SharedChainStore,
    config: PollerConfig,
}

impl Poller {
    pub fn new(chain: ChainConfig, client: std::sync::Arc<SourceClient>, store: SharedChainStore, config: PollerConfig) -> Self {
        Self { chain, client, store, config }
    }

    /// Resolves the starting block for a fresh (no-watermark) run: the
    /// configured `event_start_from`, resolving `Latest` against the
    /// source's current height, per §4.3.
    async fn resolve_start(&self) -> Result<u64, PollError> {
        match self.config.start_from {
            EventStartFrom::Block(b) => Ok(b),
            EventStartFrom::Latest => self.client.latest_block().await,
        }
    }

    async fn query_chunk(&self, from: u64, to: u64) -> Result<Vec<RawTransaction>, PollError> {
        match self.client.as_ref() {
            SourceClient::Native(native) => {
                let mut by_hash: std::collections::BTreeMap<String, RawTransaction> = Default::default();
                for predicate in NATIVE_PREDICATES {
                    for tx in native.query_events(predicate, from, to).await? {
                        by_hash
                            .entry(tx.tx_hash.clone())
                            .and_modify(|existing| existing.events.extend(tx.events.clone()))
                            .or_insert(tx);
                    }
                }
                Ok(by_hash.into_values().collect())
            }
            SourceClient::Evm(evm) => evm.query_events(from, to).await,
            SourceClient::Svm(svm) => svm.query_events(from, to).await,
        }
    }

    /// Runs one poll tick: catches up from the persisted watermark (or the
    /// configured start point on first run) to the source's latest block,
    /// in `chunk_size`-sized ranges, persisting the watermark after each
    /// chunk. Returns the number of new events ingested.
    pub async fn poll_once(&self) -> Result<u64, PollError> {
        let latest = self.client.latest_block().await?;
        let state = self.store.chain_state()?;
        let mut cursor = if state.last_block == 0 { self.resolve_start().await? } else { state.last_block };
        if cursor >= latest {
            return Ok(0);
        }

        let mut ingested = 0u64;
        while cursor < latest {
            let chunk_end = (cursor + self.config.chunk_size).min(latest);
            let txs = self.query_chunk(cursor + 1, chunk_end).await?;
            for tx in &txs {
                let events = parse_transaction(&self.chain, tx)?;
                for event in events {
                    if self.store.insert_if_not_exists(&event)? {
                        ingested += 1;
                    }
                }
            }
            if let Err(e) = self.store.advance_watermark(chunk_end) {
                warn!(chain_id = %self.chain.chain_id, error = %e, "failed to persist watermark, continuing");
            }
            cursor = chunk_end;
        }
        Ok(ingested)
    }

    /// Runs the poll loop until `shutdown` signals true, ticking at
    /// `config.poll_interval`. Cancellation only happens between ticks /
    /// chunks, never mid-query (§4.3).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(n) if n > 0 => info!(chain_id = %self.chain.chain_id, ingested = n, "poller ingested events"),
                        Ok(_) => {}
                        Err(e) => warn!(chain_id = %self.chain.chain_id, error = %e, "poll tick failed, retrying next tick"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(chain_id = %self.chain.chain_id, "poller shutting down");
                        return;
                    }
                }
            }
        }
    }
}
