//! # Outbound broadcaster (C10)
//!
//! Scans every chain's store for `Signed` events and submits each one's
//! outbound signing request to its destination chain, advancing it to
//! `Broadcasted` on success. See §4.7.

pub mod broadcaster;
pub mod error;

pub use broadcaster::{Broadcaster, BroadcasterConfig};
pub use error::BroadcastError;
