//! Error taxonomy for the event pipeline crate.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

/// Raised by an [`crate::source::EventParser`] while normalizing a raw
/// transaction's events into [`shared_types::Event`] records.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A recognized event's attributes were malformed (missing/unparsable
    /// field). Per the parser contract in §4.3 this is the only error case
    /// -- unrecognized events return `Ok(vec![])`, not an error.
    #[error("malformed attributes for event kind {kind} in tx {tx_hash}: {reason}")]
    MalformedAttributes { kind: String, tx_hash: String, reason: String },
}

impl Classify for ParseError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Protocol
    }
}

/// Raised by the source-chain client and the poller loop.
#[derive(Debug, Error)]
pub enum PollError {
    /// RPC call to the source chain failed or timed out.
    #[error("source chain rpc error: {0}")]
    Rpc(String),
    /// The underlying store rejected a read or write.
    #[error(transparent)]
    Store(#[from] uc_store::StoreError),
    /// A parser error surfaced while processing a chunk.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The chain kind does not implement the requested outbound-tx-builder
    /// operation (e.g. the home chain has no nonce/gas concept).
    #[error("chain kind does not support outbound tx building: {0}")]
    UnsupportedForChainKind(String),
}

impl Classify for PollError {
    fn class(&self) -> ErrorClass {
        match self {
            PollError::Rpc(_) => ErrorClass::Transient,
            PollError::Store(e) => e.class(),
            PollError::Parse(e) => e.class(),
            PollError::UnsupportedForChainKind(_) => ErrorClass::Protocol,
        }
    }
}

/// Raised by the confirmer loop.
#[derive(Debug, Error)]
pub enum ConfirmError {
    /// RPC call to fetch a transaction receipt failed.
    #[error("receipt fetch failed for tx {tx_hash}: {reason}")]
    ReceiptFetch { tx_hash: String, reason: String },
    /// The underlying store rejected a read or write.
    #[error(transparent)]
    Store(#[from] uc_store::StoreError),
}

impl Classify for ConfirmError {
    fn class(&self) -> ErrorClass {
        match self {
            ConfirmError::ReceiptFetch { .. } => ErrorClass::Transient,
            ConfirmError::Store(e) => e.class(),
        }
    }
}
