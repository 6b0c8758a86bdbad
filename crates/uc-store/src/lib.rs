//! # Chain-local durable store (C1)
//!
//! Per-chain embedded database -- event records, the chain-progress
//! watermark, and a shared encrypted keyshare directory. See §3 and §6
//! for the data model and persisted-state layout.

pub mod chain_store;
pub mod error;
pub mod keyshare_store;

pub use chain_store::{ChainStore, SharedChainStore, StatusCounts};
pub use error::StoreError;
pub use keyshare_store::{storage_id_for, KeyshareStore};
