//! Error taxonomy for the peer transport.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The envelope's `version` does not match [`shared_types::PeerEnvelope::CURRENT_VERSION`].
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u16),
    /// The envelope's timestamp is outside the allowed skew/age window.
    #[error("envelope timestamp {0} outside the allowed window")]
    StaleTimestamp(u64),
    /// This `(sender, nonce)` pair was already seen.
    #[error("replayed nonce {nonce} from {sender}")]
    ReplayedNonce { sender: String, nonce: u64 },
    /// `sender` has no known public key in the peer directory.
    #[error("unknown peer {0}")]
    UnknownPeer(String),
    /// A hex-encoded public key failed to decode into 32 bytes.
    #[error("malformed public key: {0}")]
    BadPublicKey(String),
    /// Signature verification failed.
    #[error("envelope signature verification failed")]
    BadSignature,
    /// `recipient` has no known network address in the peer directory.
    #[error("no known address for peer {0}")]
    UnroutablePeer(String),
    /// The HTTP send to a peer failed.
    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },
    /// The inbound receiver's channel is closed.
    #[error("inbound channel closed")]
    ChannelClosed,
}

impl Classify for TransportError {
    fn class(&self) -> ErrorClass {
        match self {
            TransportError::UnsupportedVersion(_)
            | TransportError::StaleTimestamp(_)
            | TransportError::ReplayedNonce { .. }
            | TransportError::UnknownPeer(_)
            | TransportError::BadPublicKey(_)
            | TransportError::BadSignature => ErrorClass::Protocol,
            TransportError::UnroutablePeer(_) | TransportError::SendFailed { .. } => ErrorClass::Transient,
            TransportError::ChannelClosed => ErrorClass::Fatal,
        }
    }
}
