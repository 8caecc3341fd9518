//! AES-256-GCM envelope for clipboard frames
//!
//! Every frame body is `nonce (12) || ciphertext || tag (16)`. The key is the
//! SHA-256 digest of the shared passphrase, so any UTF-8 string yields a key of
//! the right length.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of the AES-256 key in bytes
pub const KEY_LEN: usize = 32;

/// Length of the GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Smallest valid envelope: a nonce and a tag around an empty ciphertext
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN;

/// Cipher errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Envelope too short to hold a nonce and a tag
    #[error("Encrypted envelope too short: {len} bytes (min: {min} bytes)")]
    Truncated { len: usize, min: usize },

    /// Tag did not verify; the plaintext is discarded
    #[error("Authentication failed: frame was tampered with or the key does not match")]
    Authentication,

    /// Underlying AEAD refused to encrypt
    #[error("Encryption failed")]
    Encryption,
}

/// Derive the 32-byte frame key from a passphrase
pub fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.finalize().into()
}

/// Short hex fingerprint of a key, safe to log so both ends can compare keys
pub fn key_fingerprint(key: &[u8; KEY_LEN]) -> String {
    let digest = Sha256::digest(key);
    hex::encode(&digest[..4])
}

/// AES-256-GCM frame cipher
pub struct Cipher {
    cipher: Aes256Gcm,
    fingerprint: String,
    _key: Zeroizing<[u8; KEY_LEN]>,
}

impl Cipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let key = Zeroizing::new(key);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        Self {
            cipher,
            fingerprint: key_fingerprint(&key),
            _key: key,
        }
    }

    /// Create a cipher from a passphrase
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(derive_key(passphrase))
    }

    /// Fingerprint of the key this cipher was built with
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Encrypt with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        self.seal(&nonce, plaintext)
    }

    /// Encrypt with a caller-chosen nonce.
    ///
    /// The caller must never reuse a nonce with the same key; this exists so
    /// that tests can pin the otherwise random nonce.
    pub fn encrypt_with_nonce(
        &self,
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.seal(Nonce::from_slice(nonce), plaintext)
    }

    /// Verify and decrypt an envelope
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if envelope.len() < MIN_ENVELOPE_LEN {
            return Err(CryptoError::Truncated {
                len: envelope.len(),
                min: MIN_ENVELOPE_LEN,
            });
        }

        // aes-gcm expects `ciphertext || tag` and verifies before releasing anything
        let (nonce, sealed) = envelope.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Authentication)
    }

    fn seal(
        &self,
        nonce: &Nonce<<Aes256Gcm as AeadCore>::NonceSize>,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(nonce);
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
