//! Encrypted keyshare directory: `<node_home>/keyshares/<storage_id>.bin`,
//! one AES-256-GCM encrypted blob per keyshare, addressable by the storage id
//! `SHA-256(event_id)` the session manager computes on key-protocol
//! completion (§4.6).

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

const NONCE_LEN: usize = 12;

/// Derives the storage id for a keygen/keyrefresh/quorum-change event: the
/// hex-encoded SHA-256 of its event id.
#[must_use]
pub fn storage_id_for(event_id: &str) -> String {
    let digest = Sha256::digest(event_id.as_bytes());
    hex::encode(digest)
}

/// A directory of AES-256-GCM encrypted keyshare blobs, all sharing one
/// process-level symmetric secret (`USVL_KEYSHARE_SECRET`).
pub struct KeyshareStore {
    dir: PathBuf,
    cipher: Aes256Gcm,
}

impl KeyshareStore {
    /// Opens (creating if needed) the keyshare directory, deriving the
    /// AES-256 key from `secret` via SHA-256. An empty `secret` is rejected
    /// -- the keyshare secret has no safe default (§7.4).
    pub fn open(dir: impl AsRef<Path>, secret: &[u8]) -> Result<Self, StoreError> {
        if secret.is_empty() {
            return Err(StoreError::NoKeyshareSecret);
        }
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let key_bytes = Sha256::digest(secret);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Ok(Self { dir, cipher })
    }

    fn path_for(&self, storage_id: &str) -> PathBuf {
        self.dir.join(format!("{storage_id}.bin"))
    }

    /// Encrypts and writes `plaintext` under `storage_id`, overwriting any
    /// existing blob (keyshare rotation via Keyrefresh/QuorumChange reuses
    /// the same storage id only when the caller explicitly intends to
    /// replace the canonical key).
    pub fn put(&self, storage_id: &str, plaintext: &[u8]) -> Result<(), StoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| StoreError::Decrypt(storage_id.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        fs::write(self.path_for(storage_id), blob).map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Reads and decrypts the blob for `storage_id`, if present.
    pub fn get(&self, storage_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(storage_id);
        if !path.exists() {
            return Ok(None);
        }
        let blob = fs::read(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        if blob.len() < NONCE_LEN {
            return Err(StoreError::Decrypt(storage_id.to_string()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| StoreError::Decrypt(storage_id.to_string()))?;
        Ok(Some(plaintext))
    }

    /// Returns true iff a blob exists for `storage_id`, without decrypting it.
    #[must_use]
    pub fn contains(&self, storage_id: &str) -> bool {
        self.path_for(storage_id).exists()
    }
}
