//! Error taxonomy for the chain-local store, mapped into the system-wide
//! [`shared_types::ErrorClass`] at this crate's boundary.

use shared_types::{Classify, ErrorClass};
use thiserror::Error;

/// Failures raised by [`crate::ChainStore`] and [`crate::KeyshareStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying RocksDB handle could not be opened or a read/write failed.
    #[error("database io error: {0}")]
    Io(String),

    /// A stored value could not be deserialized back into its domain type.
    #[error("corrupt record for key {key}: {source}")]
    Corrupt {
        /// The key whose value failed to decode.
        key: String,
        /// The underlying serde error, as text.
        source: String,
    },

    /// Keyshare decryption failed -- either the secret is wrong or the blob
    /// has been tampered with.
    #[error("keyshare decryption failed for storage id {0}")]
    Decrypt(String),

    /// No process-level keyshare secret was configured.
    #[error("keyshare secret not configured")]
    NoKeyshareSecret,
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Io(_) => ErrorClass::Transient,
            StoreError::Corrupt { .. } | StoreError::Decrypt(_) => ErrorClass::Protocol,
            StoreError::NoKeyshareSecret => ErrorClass::Fatal,
        }
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
