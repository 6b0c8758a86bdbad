//! Error taxonomy for the chain registry.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Fetching the chain-config list from the home chain failed.
    #[error("chain config source error: {0}")]
    ConfigSource(String),
    /// Starting a chain worker failed.
    #[error(transparent)]
    WorkerStart(#[from] uc_chain::PollError),
}

impl Classify for RegistryError {
    fn class(&self) -> ErrorClass {
        match self {
            RegistryError::ConfigSource(_) => ErrorClass::Transient,
            RegistryError::WorkerStart(e) => e.class(),
        }
    }
}
