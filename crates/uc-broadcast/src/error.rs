//! Error taxonomy for the outbound broadcaster.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    /// A `Signed` event carried no `signing_data` in `event_data`.
    #[error("event {0} has no signing data")]
    MissingSigningData(String),
    /// A `Signed` event carried no `destination_chain_id`.
    #[error("event {0} has no destination chain")]
    MissingDestinationChain(String),
    /// No running client for the event's destination chain.
    #[error("no destination client for chain {0}")]
    NoDestinationClient(String),
    /// The stored signature hex failed to decode.
    #[error("invalid signature for event {event_id}: {reason}")]
    InvalidSignature { event_id: String, reason: String },
    /// Destination-chain RPC interaction (nonce lookup, broadcast) failed.
    #[error(transparent)]
    Poll(#[from] uc_chain::PollError),
    /// The chain store rejected a read or write.
    #[error(transparent)]
    Store(#[from] uc_store::StoreError),
}

impl Classify for BroadcastError {
    fn class(&self) -> ErrorClass {
        match self {
            BroadcastError::MissingSigningData(_)
            | BroadcastError::MissingDestinationChain(_)
            | BroadcastError::NoDestinationClient(_)
            | BroadcastError::InvalidSignature { .. } => ErrorClass::Protocol,
            BroadcastError::Poll(e) => e.class(),
            BroadcastError::Store(e) => e.class(),
        }
    }
}
