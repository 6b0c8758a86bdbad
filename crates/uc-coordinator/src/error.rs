//! Error taxonomy for the coordinator.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Fetching the Universal Validator set from the home chain failed.
    #[error("validator set source error: {0}")]
    ValidatorSetSource(String),
    /// Fetching a destination chain's gas price from the oracle failed.
    #[error("gas price oracle error for {chain_id}: {reason}")]
    Oracle { chain_id: String, reason: String },
    /// No running client for the event's destination chain (disabled, or not
    /// yet reconciled by the registry).
    #[error("no destination client for chain {0}")]
    NoDestinationClient(String),
    /// The event carries no `destination_chain_id` (malformed Sign event).
    #[error("sign event {0} has no destination_chain_id")]
    MissingDestinationChain(String),
    /// Building the outbound signing request failed.
    #[error(transparent)]
    Poll(#[from] uc_chain::PollError),
    /// The underlying chain store rejected a read or write.
    #[error(transparent)]
    Store(#[from] uc_store::StoreError),
    /// Sending a setup/begin message over the transport failed.
    #[error(transparent)]
    Transport(#[from] uc_transport::TransportError),
}

impl Classify for CoordinatorError {
    fn class(&self) -> ErrorClass {
        match self {
            CoordinatorError::ValidatorSetSource(_)
            | CoordinatorError::Oracle { .. }
            | CoordinatorError::NoDestinationClient(_) => ErrorClass::Transient,
            CoordinatorError::MissingDestinationChain(_) => ErrorClass::Protocol,
            CoordinatorError::Poll(e) => e.class(),
            CoordinatorError::Store(e) => e.class(),
            CoordinatorError::Transport(e) => e.class(),
        }
    }
}
