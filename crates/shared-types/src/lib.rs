//! # Shared Types Crate
//!
//! Domain entities and wire types shared by every crate in the Universal
//! Client workspace: the normalized `Event`, `ChainConfig`, the session
//! wire format (`PeerEnvelope` / `SessionMessage`), and the error taxonomy
//! every crate-boundary error enum maps into.
//!
//! ## Design principles
//!
//! - **Single source of truth**: cross-crate record types live here, not
//!   duplicated per crate.
//! - **Envelope integrity**: `PeerEnvelope` is the sole wrapper for session
//!   protocol messages crossing the peer transport; payloads never duplicate
//!   `sender`.

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::{
    sanitize_chain_id, BlockConfirmation, ChainConfig, ChainId, ChainState, ConfirmationType, EnabledFlags, Event,
    EventStatus, EventType, GatewayMethod, KeyshareHandle, SigningData, VmType,
};
pub use envelope::{PeerEnvelope, SessionMessage, SessionMessageKind, UnsignedOutbound};
pub use errors::{Classify, ErrorClass};
