//! # Core Domain Entities
//!
//! Defines the record types shared by every component of the validator daemon:
//! the normalized `Event`, the chain configuration fetched from the home chain's
//! registry, the per-chain watermark, and the keyshare handle.
//!
//! ## Clusters
//!
//! - **Chain identity**: `ChainId`, `VmType`, `ChainConfig`, `GatewayMethod`
//! - **Event pipeline**: `Event`, `EventType`, `EventStatus`, `ConfirmationType`
//! - **Storage**: `ChainState`, `KeyshareHandle`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLUSTER A: CHAIN IDENTITY
// =============================================================================

/// A CAIP-2 namespaced chain identifier, e.g. `eip155:1`, `solana:mainnet`.
///
/// Compares and hashes by the raw string; callers that need a filesystem-safe
/// form should go through [`sanitize_chain_id`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    /// The synthetic identifier for the home Push chain.
    pub const PUSH: &'static str = "push:1";

    /// Borrow the underlying CAIP-2 string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the home Push chain.
    #[must_use]
    pub fn is_push(&self) -> bool {
        self.0 == Self::PUSH
    }

    /// Filesystem-safe form of this chain id, see [`sanitize_chain_id`].
    #[must_use]
    pub fn sanitized(&self) -> String {
        sanitize_chain_id(&self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Replaces every non-alphanumeric byte in a CAIP-2 chain id with `_`, producing
/// a name safe to use as a database filename.
///
/// ```
/// use shared_types::entities::sanitize_chain_id;
/// assert_eq!(sanitize_chain_id("eip155:1"), "eip155_1");
/// assert_eq!(sanitize_chain_id("solana:mainnet"), "solana_mainnet");
/// assert_eq!(sanitize_chain_id("localchain_9000-1"), "localchain_9000-1");
/// ```
#[must_use]
pub fn sanitize_chain_id(chain_id: &str) -> String {
    chain_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// The virtual machine family a chain's gateway contract runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmType {
    /// EVM-compatible chains (log-based gateway events).
    Evm,
    /// Solana-style chains (program log matching).
    Svm,
    /// The home Push chain itself.
    Native,
}

/// A single gateway method/event pair the parser matches against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMethod {
    /// Human-readable method name, e.g. `"addLiquidity"`.
    pub name: String,
    /// The method identifier (EVM: 4-byte selector hex; SVM: discriminator hex).
    pub method_identifier: String,
    /// The event identifier emitted on success (EVM: topic0 hex; SVM: log tag).
    pub event_identifier: String,
}

/// The two independent enable switches a chain config carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnabledFlags {
    /// Whether inbound events are ingested from this chain.
    pub inbound: bool,
    /// Whether outbound transactions are broadcast to this chain.
    pub outbound: bool,
}

/// Required confirmation counts for a chain, by [`ConfirmationType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfirmation {
    /// Confirmations required for `ConfirmationType::Fast`.
    pub fast: u64,
    /// Confirmations required for `ConfirmationType::Standard`.
    pub standard: u64,
}

/// A chain's configuration as fetched from the home chain's registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// CAIP-2 chain identifier.
    pub chain_id: ChainId,
    /// Virtual machine family.
    pub vm_type: VmType,
    /// The gateway contract/program address on the external chain.
    pub gateway_address: String,
    /// Public RPC URL, overridable via `USVL_CHAIN_RPC_<CHAIN_ID_UPPER>`.
    pub public_rpc_url: String,
    /// Inbound/outbound enable switches.
    pub enabled: EnabledFlags,
    /// Required confirmation counts.
    pub block_confirmation: BlockConfirmation,
    /// Gateway methods this chain's parser recognizes.
    pub gateway_methods: Vec<GatewayMethod>,
    /// Poll-tick interval override, in seconds; `None` uses the node default.
    pub poll_interval_secs: Option<u64>,
    /// Cleaner-tick interval override, in seconds; `None` uses the node default.
    pub cleanup_interval_secs: Option<u64>,
}

impl ChainConfig {
    /// The reconcile-equality fields per the registry's comparison rule:
    /// chain id, VM type, gateway address, and both enabled flags. Any other
    /// field differing does not trigger an Update.
    #[must_use]
    pub fn reconcile_eq(&self, other: &ChainConfig) -> bool {
        self.chain_id == other.chain_id
            && self.vm_type == other.vm_type
            && self.gateway_address == other.gateway_address
            && self.enabled == other.enabled
    }
}

// =============================================================================
// CLUSTER B: EVENT PIPELINE
// =============================================================================

/// The kind of TSS process an event drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Distributed key generation: creates a brand-new TSS key.
    Keygen,
    /// Key refresh: re-randomizes existing shares without changing the public key.
    Keyrefresh,
    /// Quorum change: adds or removes a party from the signing set.
    QuorumChange,
    /// A signing request for an outbound transaction.
    Sign,
}

impl EventType {
    /// Returns true for the three key-management protocols (as opposed to `Sign`).
    #[must_use]
    pub fn is_key_protocol(self) -> bool {
        !matches!(self, EventType::Sign)
    }
}

/// How many source-chain confirmations an event requires before promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationType {
    /// No confirmation wait; promoted on the next confirmer tick.
    Instant,
    /// Uses the chain's fast-inbound confirmation count.
    Fast,
    /// Uses the chain's standard-inbound confirmation count.
    Standard,
}

/// The event lifecycle state, see the transition diagram in the module docs
/// of [`crate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Ingested but not yet confirmed by the source chain.
    Pending,
    /// Confirmed by the source chain, awaiting session assignment.
    Confirmed,
    /// A TSS session has been opened for this event.
    InProgress,
    /// A Sign session completed; awaiting broadcast.
    Signed,
    /// Broadcast to the destination chain.
    Broadcasted,
    /// A key protocol completed and the home-chain vote succeeded.
    Completed,
    /// A key protocol's home-chain vote failed.
    Reverted,
}

impl EventStatus {
    /// Returns true for the three terminal statuses eligible for cleanup.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Broadcasted | EventStatus::Completed | EventStatus::Reverted)
    }

    /// Validates a single proposed transition against the allowed graph.
    /// The only backward edge is `InProgress -> Confirmed` (session expiry).
    #[must_use]
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::{Broadcasted, Completed, Confirmed, InProgress, Pending, Reverted, Signed};
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Confirmed)
                | (InProgress, Signed)
                | (InProgress, Completed)
                | (InProgress, Reverted)
                | (Signed, Broadcasted)
        )
    }
}

/// The system's central record: a normalized chain event moving through the
/// lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier: `txHash:logIndex` for external chains, the TSS
    /// process id for home-chain events. Unique per chain database.
    pub event_id: String,
    /// The chain this event was ingested from.
    pub chain_id: ChainId,
    /// Block height at which the event was observed.
    pub block_height: u64,
    /// Block height at which this event's session becomes invalid.
    pub expiry_block_height: u64,
    /// The TSS process this event drives.
    pub event_type: EventType,
    /// Confirmation policy applied by the confirmer.
    pub confirmation_type: ConfirmationType,
    /// Current lifecycle status.
    pub status: EventStatus,
    /// Opaque, chain-type-specific payload (parsed attributes, and later the
    /// `signing_data` merged in on Sign completion).
    pub event_data: serde_json::Value,
    /// CAIP-tagged broadcast transaction hash once broadcast, e.g.
    /// `eip155:1:0xabc...`.
    pub broadcasted_tx_hash: Option<String>,
    /// Home-chain vote transaction hash, set on key-protocol completion.
    pub vote_tx_hash: Option<String>,
    /// Wall-clock timestamp (unix seconds) recorded when the event reached a
    /// terminal status, used by the cleaner when the chain's block time is
    /// unknown.
    pub terminal_at: Option<u64>,
}

impl Event {
    /// Validates the `expiry_block_height > block_height` invariant.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.expiry_block_height > self.block_height
    }

    /// Attempts the transition, returning `false` (no mutation) if disallowed.
    #[must_use]
    pub fn try_transition(&mut self, next: EventStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// The destination chain a `Sign` event's outbound transaction targets,
    /// read from the `destination_chain_id` key the parser (C2) populates in
    /// `event_data` for outbound-created events. `None` for key-protocol
    /// events, which have no destination chain.
    #[must_use]
    pub fn destination_chain_id(&self) -> Option<ChainId> {
        self.event_data.get("destination_chain_id").and_then(serde_json::Value::as_str).map(ChainId::from)
    }

    /// The `signing_data` the session manager merges into `event_data` on
    /// Sign completion (§4.6), if present.
    #[must_use]
    pub fn signing_data(&self) -> Option<SigningData> {
        self.event_data.get("signing_data").and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Merges a completed Sign session's result into `event_data` under the
    /// `signing_data` key, creating the object if `event_data` was not
    /// already one.
    pub fn set_signing_data(&mut self, data: &SigningData) {
        if !self.event_data.is_object() {
            self.event_data = serde_json::json!({});
        }
        self.event_data["signing_data"] = serde_json::to_value(data).expect("SigningData always serializes");
    }
}

/// The result of a completed Sign session, merged into an event's
/// `event_data` under `signing_data` and consumed by the broadcaster (C10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningData {
    /// Hex-encoded threshold signature.
    pub signature_hex: String,
    /// Hex-encoded canonical signing hash the signature is over.
    pub signing_hash_hex: String,
    /// Destination-chain nonce the signature was produced under.
    pub nonce: u64,
    /// Destination-chain gas price the signature was produced under.
    pub gas_price: String,
}

// =============================================================================
// CLUSTER C: STORAGE
// =============================================================================

/// One row per chain database: the last block height successfully processed.
/// Monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainState {
    /// Last block height whose events have been fully ingested.
    pub last_block: u64,
}

/// A handle to an encrypted keyshare blob on disk, addressable by the
/// SHA-256 of the keygen session's event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyshareHandle {
    /// Hex-encoded storage id (`SHA-256(event_id)`).
    pub storage_id: String,
    /// The public key this keyshare contributes to, if known.
    pub public_key_hex: Option<String>,
}
