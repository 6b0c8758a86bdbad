//! # Event pipeline (C2-C5)
//!
//! The event parser, poller, confirmer, cleaner, and the chain worker that
//! composes them for one chain. See §4.2-§4.4.

pub mod cleaner;
pub mod confirmer;
pub mod error;
pub mod parser;
pub mod poller;
pub mod source;
pub mod worker;

pub use error::{ConfirmError, ParseError, PollError};
pub use parser::parse_transaction;
pub use source::{
    DestinationClients, EvmClient, NativeClient, RawEvent, RawTransaction, SharedSourceClient, SigningRequest,
    SourceClient, SvmClient, TxReceipt,
};
pub use worker::{ChainStores, ChainWorker, WorkerDefaults};
