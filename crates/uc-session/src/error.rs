//! Error taxonomy for the session manager.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Setup referenced an event that does not exist in the chain's store.
    #[error("event {0} not found")]
    EventNotFound(String),
    /// Setup referenced an event not currently `Confirmed`, or whose
    /// `expiry_block_height` has already passed.
    #[error("event {0} is not confirmed or has already expired")]
    EventNotConfirmed(String),
    /// Setup came from someone other than the epoch's elected coordinator.
    #[error("sender {sender} is not the coordinator for event {event_id}")]
    NotCoordinator { event_id: String, sender: String },
    /// The setup's participant list did not match the protocol's eligibility
    /// rule (exact eligible set for key protocols, correct-size subset for Sign).
    #[error("participant list for event {0} does not match protocol requirements")]
    ParticipantMismatch(String),
    /// The independently recomputed signing hash did not match the
    /// coordinator's.
    #[error("signing hash mismatch for event {0}")]
    SigningHashMismatch(String),
    /// The coordinator's gas price was outside the ±10% tolerance of the
    /// local oracle's price.
    #[error("coordinator gas price {proposed} out of range of local oracle price {local} for event {event_id}")]
    GasPriceOutOfRange { event_id: String, proposed: String, local: String },
    /// The coordinator's nonce was below the finalized on-chain nonce.
    #[error("coordinator nonce {proposed} below finalized nonce {finalized} for event {event_id}")]
    NonceTooLow { event_id: String, proposed: u64, finalized: u64 },
    /// A message (Begin/Step) referenced a session this node has no record of.
    #[error("no session for event {0}")]
    UnknownSession(String),
    /// Begin or Step arrived from someone not authorized for that role.
    #[error("sender {sender} is not authorized for event {event_id}")]
    UnauthorizedSender { event_id: String, sender: String },
    /// The underlying crypto state machine rejected an operation.
    #[error("crypto session error for event {event_id}: {reason}")]
    Crypto { event_id: String, reason: String },
    /// Submitting `VoteTssKeyProcess` to the home chain failed.
    #[error("home chain vote failed for event {0}: {1}")]
    VoteFailed(String, String),
    /// Destination-chain interaction (nonce/signing-request lookup) failed.
    #[error(transparent)]
    Poll(#[from] uc_chain::PollError),
    /// The chain store rejected a read or write.
    #[error(transparent)]
    Store(#[from] uc_store::StoreError),
    /// Sending a session message over the transport failed.
    #[error(transparent)]
    Transport(#[from] uc_transport::TransportError),
}

impl Classify for SessionError {
    fn class(&self) -> ErrorClass {
        match self {
            SessionError::EventNotFound(_)
            | SessionError::EventNotConfirmed(_)
            | SessionError::NotCoordinator { .. }
            | SessionError::ParticipantMismatch(_)
            | SessionError::SigningHashMismatch(_)
            | SessionError::GasPriceOutOfRange { .. }
            | SessionError::NonceTooLow { .. }
            | SessionError::UnknownSession(_)
            | SessionError::UnauthorizedSender { .. } => ErrorClass::Protocol,
            SessionError::Crypto { .. } => ErrorClass::Protocol,
            SessionError::VoteFailed(_, _) => ErrorClass::Transient,
            SessionError::Poll(e) => e.class(),
            SessionError::Store(e) => e.class(),
            SessionError::Transport(e) => e.class(),
        }
    }
}
