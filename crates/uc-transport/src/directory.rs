//! Maps a validator's operator address to the two things the transport needs
//! to reach it: its ed25519 public key (for envelope verification) and its
//! network address (for sending).

use std::collections::HashMap;

use parking_lot::RwLock;

/// One entry in the peer directory.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Hex-encoded ed25519 public key.
    pub public_key_hex: String,
    /// `host:port` (or full URL) the peer's transport listens on.
    pub address: String,
}

/// Resolves operator addresses to [`PeerInfo`]. Implemented as a trait so the
/// coordinator's validator-set refresh (C7) can keep it current without the
/// transport depending on that crate.
pub trait PeerDirectory: Send + Sync {
    /// Looks up `operator`'s info, or `None` if it is not a known validator.
    fn lookup(&self, operator: &str) -> Option<PeerInfo>;
}

/// An in-memory directory, refreshed wholesale whenever the validator set
/// changes.
#[derive(Default)]
pub struct InMemoryPeerDirectory {
    entries: RwLock<HashMap<String, PeerInfo>>,
}

impl InMemoryPeerDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entire directory contents.
    pub fn replace(&self, entries: HashMap<String, PeerInfo>) {
        *self.entries.write() = entries;
    }

    /// Inserts or updates one entry.
    pub fn upsert(&self, operator: String, info: PeerInfo) {
        self.entries.write().insert(operator, info);
    }
}

impl PeerDirectory for InMemoryPeerDirectory {
    fn lookup(&self, operator: &str) -> Option<PeerInfo> {
        self.entries.read().get(operator).cloned()
    }
}
