//! # Session manager (C8)
//!
//! Owns every TSS session this node participates in: validates and acts on
//! inbound `Setup`/`Begin`/`Step` messages per §4.6, drives the crypto state
//! machine behind the [`crypto::DklsFactory`] boundary, persists completed
//! key protocols and signatures back into the event pipeline, and expires
//! sessions that never complete.

pub mod crypto;
pub mod error;
pub mod session;
pub mod vote_client;

pub use crypto::{DklsFactory, DklsSession, OutboundMessage, ProtocolKind, SessionParams, SessionResult, SimulatedDklsFactory, StepOutput};
pub use error::SessionError;
pub use session::{
    SessionManager, SessionManagerConfig, DEFAULT_EXPIRY_CHECK_INTERVAL_SECS, DEFAULT_GAS_PRICE_TOLERANCE_PCT,
    DEFAULT_RETRY_DELAY_BLOCKS, DEFAULT_SESSION_TTL_SECS,
};
pub use vote_client::{HomeChainVoteClient, HttpHomeChainVoteClient};
