//! The crypto collaborator boundary (§9 design note): the concrete DKLS
//! library is out of scope for this implementation (§1), so every round of
//! the threshold protocol is driven through this minimal `Session`
//! interface -- `InputMessage`, `Step`, `GetResult`, `Close` -- exactly as
//! the design note specifies. [`SimulatedDklsFactory`] is the stand-in used
//! until a real DKLS binding is wired in; see DESIGN.md for the substitution
//! point.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::SessionError;

/// Which TSS protocol a session is driving. Mirrors [`shared_types::EventType`]
/// but lives in crypto-facing terms so this module has no dependency on the
/// event pipeline's types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Keygen,
    Keyrefresh,
    QuorumChange,
    Sign,
}

/// One outbound protocol message produced by a [`Step`](DklsSession::step) call.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Party id (operator address) of the intended receiver.
    pub to_party: String,
    /// Opaque protocol payload.
    pub payload: Vec<u8>,
}

/// The outcome of one [`DklsSession::step`] call.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Messages to route to other participants (or loop back to this node).
    pub outbound: Vec<OutboundMessage>,
    /// Whether the protocol has finished; if so, [`DklsSession::result`] is
    /// populated.
    pub done: bool,
}

/// The protocol's final output, as named in the design note:
/// `{keyshare?, signature?, publicKey?}`.
#[derive(Debug, Clone, Default)]
pub struct SessionResult {
    pub keyshare: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
    pub public_key_hex: Option<String>,
}

/// Parameters needed to construct a session, gathered per §4.6: Keygen needs
/// only setup+partyID+participants+threshold; Keyrefresh/QuorumChange
/// additionally need the current keyshare (QuorumChange tolerates a missing
/// one, meaning "new party"); Sign needs the keyshare and signing hash.
pub struct SessionParams {
    pub protocol: ProtocolKind,
    pub local_party: String,
    pub participants: Vec<String>,
    pub threshold: usize,
    pub keyshare: Option<Vec<u8>>,
    pub signing_hash: Option<Vec<u8>>,
}

/// A single running instance of the threshold protocol's state machine.
/// Not `Sync`: the session manager serializes every call behind a per-session
/// mutex (§5), matching the "not thread-safe" note in the design section.
pub trait DklsSession: Send {
    /// Feeds one inbound protocol message from `from_party` into the session.
    fn input_message(&mut self, from_party: &str, payload: &[u8]) -> Result<(), SessionError>;

    /// Advances the state machine one round, returning any messages to route
    /// and whether the protocol is now finished.
    fn step(&mut self) -> Result<StepOutput, SessionError>;

    /// The protocol's output, available once `step` has reported `done`.
    fn result(&self) -> Option<SessionResult>;

    /// Releases any resources the session holds (key material in memory).
    fn close(&mut self);
}

/// Constructs new [`DklsSession`]s. The factory boundary is where a real
/// DKLS binding would be substituted in for [`SimulatedDklsFactory`].
pub trait DklsFactory: Send + Sync {
    fn new_session(&self, params: SessionParams) -> Result<Box<dyn DklsSession>, SessionError>;
}

/// A stand-in crypto engine: completes the whole protocol in a single local
/// `step()` call with no peer round trips, deriving deterministic output from
/// the session parameters via SHA-256. This lets the rest of the system --
/// setup/ack/begin/step routing, completion handling, session expiry -- be
/// fully exercised without the real DKLS library, which this implementation
/// treats as an external collaborator (§1).
pub struct SimulatedDklsFactory;

impl DklsFactory for SimulatedDklsFactory {
    fn new_session(&self, params: SessionParams) -> Result<Box<dyn DklsSession>, SessionError> {
        Ok(Box::new(SimulatedSession { params, done: false }))
    }
}

struct SimulatedSession {
    params: SessionParams,
    done: bool,
}

impl DklsSession for SimulatedSession {
    fn input_message(&mut self, _from_party: &str, _payload: &[u8]) -> Result<(), SessionError> {
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutput, SessionError> {
        if self.done {
            return Ok(StepOutput { outbound: Vec::new(), done: true });
        }
        self.done = true;
        Ok(StepOutput { outbound: Vec::new(), done: true })
    }

    fn result(&self) -> Option<SessionResult> {
        if !self.done {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.params.local_party.as_bytes());
        for p in &self.params.participants {
            hasher.update(p.as_bytes());
        }
        if let Some(keyshare) = &self.params.keyshare {
            hasher.update(keyshare);
        }
        if let Some(hash) = &self.params.signing_hash {
            hasher.update(hash);
        }
        let digest = hasher.finalize();

        match self.params.protocol {
            ProtocolKind::Sign => Some(SessionResult {
                keyshare: None,
                signature: Some(digest.to_vec()),
                public_key_hex: None,
            }),
            _ => Some(SessionResult {
                keyshare: Some(digest.to_vec()),
                signature: None,
                public_key_hex: Some(hex::encode(digest)),
            }),
        }
    }

    fn close(&mut self) {
        self.done = true;
    }
}

/// Resolves a party id (operator address) to peer id for message routing.
/// Since this system's party id *is* the operator address (see DESIGN.md),
/// routing a `Step` output message is just handing it to the transport
/// addressed by `to_party` directly -- no separate translation table is
/// needed, unlike systems where crypto-library party indices differ from
/// network identities.
#[must_use]
pub fn is_local_party(to_party: &str, local_party: &str) -> bool {
    to_party == local_party
}

/// Builds the participants-as-index map a real DKLS binding would need
/// (stable 0-based index per participant, sorted) -- kept available for a
/// future non-simulated factory even though [`SimulatedDklsFactory`] does
/// not use it.
#[must_use]
pub fn participant_indices(participants: &[String]) -> HashMap<String, usize> {
    let mut sorted = participants.to_vec();
    sorted.sort();
    sorted.into_iter().enumerate().map(|(i, p)| (p, i)).collect()
}
