//! # Chain registry (C6)
//!
//! Maintains the live `{chain id -> running worker}` map, reconciling it
//! against the remotely fetched chain-config list on a fixed interval. See
//! §4.1.

pub mod config_source;
pub mod error;
pub mod registry;

pub use config_source::{ChainConfigSource, HttpChainConfigSource};
pub use error::RegistryError;
pub use registry::{ChainRegistry, DEFAULT_CONFIG_REFRESH_INTERVAL};
