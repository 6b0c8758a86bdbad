//! # Universal Client integration suite
//!
//! Cross-crate scenarios that don't fit inside any single `uc-*` crate's
//! own `#[cfg(test)]` modules: flows that need two or more components
//! wired together against a fake RPC backend.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support/          # Mock JSON-RPC backend shared by the scenarios below
//! └── integration/
//!     ├── chain_pipeline.rs   # poller -> confirmer -> store, against mock EVM/SVM RPC
//!     ├── broadcast.rs        # broadcaster nonce semantics (§4.7, §8 scenario 5)
//!     └── coordination.rs     # coordinator election + participant selection (§4.5)
//! ```
//!
//! ## Running
//!
//! ```bash
//! cargo test -p uc-tests
//! cargo bench -p uc-tests
//! ```

pub mod integration;
pub mod support;
