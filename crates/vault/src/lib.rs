//! Credential Vault (spec §4.3).
//!
//! AES-256-GCM symmetric encryption keyed by a 32-byte process secret.
//! `encrypt`/`decrypt` are pure functions; ciphertext is an opaque,
//! self-contained blob (nonce ‖ ciphertext ‖ tag, base64-encoded) so the
//! persistence layer never needs to know anything about the scheme.
//! Plaintext credentials live only inside an active adapter instance.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid process secret: expected 32 bytes, got {0}")]
    InvalidSecretLength(usize),

    #[error("ciphertext is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("ciphertext is malformed or truncated")]
    Malformed,

    #[error("decryption failed: ciphertext is corrupt or the wrong key was used")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

pub type Result<T> = std::result::Result<T, VaultError>;

const NONCE_LEN: usize = 12;

/// Holds the process-wide 32-byte secret and performs encrypt/decrypt.
/// The secret is zeroized on drop.
pub struct CredentialVault {
    key_bytes: [u8; 32],
}

impl Drop for CredentialVault {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

impl CredentialVault {
    /// Builds a vault from a raw 32-byte secret.
    ///
    /// # Errors
    /// Returns an error if `secret` is not exactly 32 bytes.
    pub fn new(secret: &[u8]) -> Result<Self> {
        let key_bytes: [u8; 32] = secret
            .try_into()
            .map_err(|_| VaultError::InvalidSecretLength(secret.len()))?;
        Ok(Self { key_bytes })
    }

    /// Builds a vault from a hex- or base64-encoded secret, as would be read
    /// from the `vault.secret_env` environment variable.
    ///
    /// # Errors
    /// Returns an error if the decoded secret is not 32 bytes.
    pub fn from_encoded_secret(secret: &SecretString) -> Result<Self> {
        let raw = secret.expose_secret();
        let bytes = hex::decode(raw)
            .or_else(|_| BASE64.decode(raw))
            .map_err(|_| VaultError::InvalidSecretLength(raw.len()))?;
        Self::new(&bytes)
    }

    /// Encrypts `plaintext`, returning a base64-encoded opaque blob.
    ///
    /// # Errors
    /// Returns an error if the underlying AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = Key::<Aes256Gcm>::from_slice(&self.key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypts a blob produced by [`Self::encrypt`].
    ///
    /// # Errors
    /// Returns an error if the blob is malformed, not valid base64, or
    /// fails authentication.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::InvalidEncoding(e.to_string()))?;
        if blob.len() <= NONCE_LEN {
            return Err(VaultError::Malformed);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let key = Key::<Aes256Gcm>::from_slice(&self.key_bytes);
        let cipher = Aes256Gcm::new(key);
        let plaintext = cipher
            .decrypt(nonce_bytes.into(), ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
    }
}
