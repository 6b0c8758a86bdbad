//! # Session wire format
//!
//! The message shape exchanged between validator nodes during the session
//! setup/ack/begin/step handshake (see the "Peer transport" contract in the
//! module docs of [`crate`]). Encoded as JSON over whatever point-to-point
//! authenticated transport the node is configured with -- this crate only
//! fixes the shape, not the wire.

use serde::{Deserialize, Serialize};

/// Signing metadata attached to a Sign setup message only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedOutbound {
    /// The canonical signing hash, hex-encoded.
    pub signing_hash: String,
    /// The destination-chain nonce the coordinator computed this request under.
    pub nonce: u64,
    /// The gas price the coordinator computed this request under, as a decimal string.
    pub gas_price: String,
}

/// The four message kinds a session exchanges between coordinator and participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMessageKind {
    /// Coordinator -> participants: opens a session.
    Setup,
    /// Participant -> coordinator: setup accepted.
    Ack,
    /// Coordinator -> participants: starts the crypto state machine.
    Begin,
    /// Any participant -> any participant: a crypto protocol round message.
    Step,
}

/// A single session-protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Which of the four kinds this is.
    #[serde(rename = "type")]
    pub kind: SessionMessageKind,
    /// The event id this session belongs to.
    pub event_id: String,
    /// Opaque protocol payload: empty for setup/ack/begin bookkeeping beyond
    /// what's below, or a crypto round message for `Step`.
    pub payload: Vec<u8>,
    /// Present only on `Setup`: the full participant list (operator bech32
    /// addresses), in the order the coordinator enumerated them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    /// Present only on a Sign event's `Setup`: the unsigned outbound request
    /// the coordinator wants participants to independently verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned_outbound: Option<UnsignedOutbound>,
}

/// The authenticated envelope every [`SessionMessage`] travels inside.
///
/// A monotonic nonce plus a timestamp window defend against replay, and
/// `sender` is the sole source of truth for who sent the message -- nothing
/// inside `payload` should duplicate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEnvelope {
    /// Wire format version, checked before deserializing `payload`.
    pub version: u16,
    /// The sending validator's operator address (bech32).
    pub sender: String,
    /// The intended recipient's operator address (bech32).
    pub recipient: String,
    /// Unix timestamp (seconds) when the envelope was created.
    pub timestamp: u64,
    /// Unique nonce for replay prevention within the timestamp window.
    pub nonce: u64,
    /// Signature over the serialized `payload`, verified using the sender's
    /// known public key.
    pub signature: Vec<u8>,
    /// The session message being transported.
    pub payload: SessionMessage,
}

impl PeerEnvelope {
    /// Current wire format version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Maximum allowed clock skew for future timestamps, in seconds.
    pub const MAX_FUTURE_SKEW_SECS: u64 = 10;

    /// Maximum age for a valid timestamp, in seconds.
    pub const MAX_AGE_SECS: u64 = 60;
}
