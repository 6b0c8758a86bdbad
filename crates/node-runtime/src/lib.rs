//! # Universal Client validator daemon
//!
//! Wires the chain registry, coordinator, session manager, peer transport,
//! and outbound broadcaster into one process and drives them to completion.
//! Re-exported as a library so the integration test crate can build a
//! [`wiring::Daemon`] against in-process collaborators without going through
//! `main`.

pub mod config;
pub mod health;
pub mod wiring;

pub use config::{ConfigError, NodeConfig};
pub use wiring::Daemon;
