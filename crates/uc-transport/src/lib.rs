//! # Peer transport (C9)
//!
//! Signs, authenticates, and carries [`shared_types::PeerEnvelope`] messages
//! between validator nodes during TSS session handshakes. See §6.

pub mod directory;
pub mod error;
pub mod signer;
pub mod transport;

pub use directory::{InMemoryPeerDirectory, PeerDirectory, PeerInfo};
pub use error::TransportError;
pub use signer::EnvelopeSigner;
pub use transport::{HttpPeerTransport, PeerTransport};
