//! Envelope signing and verification (ed25519, deterministic nonces).
//!
//! Mirrors the key-pair shape the rest of the validator daemon uses for its
//! other cryptographic primitives: wrap the library type, expose only what
//! the transport needs.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::TransportError;

/// This node's signing identity, loaded from the keyshare store's secret
/// material at startup.
pub struct EnvelopeSigner {
    signing_key: SigningKey,
}

impl EnvelopeSigner {
    /// Builds a signer from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(&seed) }
    }

    /// Generates a fresh signer, for tests and local development nodes.
    #[must_use]
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut rand::thread_rng()) }
    }

    /// This signer's public key, hex-encoded.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs `message`, returning the raw 64-byte signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

/// Verifies `signature` over `message` against `public_key_hex`.
pub fn verify(public_key_hex: &str, message: &[u8], signature: &[u8]) -> Result<(), TransportError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .map_err(|_| TransportError::BadPublicKey(public_key_hex.to_string()))?
        .try_into()
        .map_err(|_| TransportError::BadPublicKey(public_key_hex.to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| TransportError::BadPublicKey(public_key_hex.to_string()))?;
    let sig_bytes: [u8; 64] =
        signature.try_into().map_err(|_| TransportError::BadSignature)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).map_err(|_| TransportError::BadSignature)
}
