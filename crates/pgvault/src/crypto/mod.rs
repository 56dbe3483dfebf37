//! Transparent field encryption: AES-256-GCM over individual string values.
//!
//! Each encrypted value is self-contained: a fresh random 96-bit nonce is
//! generated per call and prepended to the ciphertext, and the pair is
//! base64-encoded for transport. Encryption is therefore probabilistic -
//! the same plaintext never encodes to the same output twice - which is
//! also why equality filtering against encrypted columns can never work.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

/// AES-GCM nonce size in bytes (96 bits).
const NONCE_LEN: usize = 12;

/// Reserved marker substituted for a field that failed to decrypt.
///
/// Read paths never abort a whole row over one corrupt field; they
/// substitute this marker so the failure is visible without masquerading as
/// real content. Every substitution is also logged at WARN level.
pub const DECRYPT_FAILED_SENTINEL: &str = "\u{26A0} unable to decrypt";

/// An opaque 256-bit symmetric key handle.
///
/// The key is supplied externally (a credential provider, an environment
/// variable, a passphrase prompt); this crate never persists or transmits
/// key material. Rotating the key means rebuilding the table operations
/// bound to it.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Wrap externally supplied raw key material.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a passphrase via SHA-256.
    ///
    /// Convenience for callers without a credential provider; the derived
    /// key lives only in memory.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        Self(hasher.finalize().into())
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Encrypt a single string value.
///
/// Returns `base64(nonce || ciphertext)`. A fresh nonce is generated per
/// call, so repeated encryptions of the same plaintext differ.
pub fn encrypt_value(plaintext: &str, key: &EncryptionKey) -> Result<String> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64_STANDARD.encode(combined))
}

/// Decrypt a value produced by [`encrypt_value`].
///
/// Any failure - wrong key, tampered or truncated input, or plaintext that
/// was never encrypted - is a [`VaultError::Decryption`], distinct from
/// every other error in the crate.
pub fn decrypt_value(encoded: &str, key: &EncryptionKey) -> Result<String> {
    let combined = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| VaultError::Decryption(format!("invalid encoding: {}", e)))?;

    if combined.len() <= NONCE_LEN {
        return Err(VaultError::Decryption("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Decryption("authentication failed".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|e| VaultError::Decryption(format!("invalid UTF-8 in plaintext: {}", e)))
}
