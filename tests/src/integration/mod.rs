//! Cross-crate scenarios, one module per subsystem boundary exercised.

mod broadcast;
mod chain_pipeline;
mod coordination;
