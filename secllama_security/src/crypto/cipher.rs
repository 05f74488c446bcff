//! AES-256-GCM cipher engine.
//!
//! # Ciphertext Format
//!
//! ```text
//! [nonce: 12 bytes][ciphertext + tag: variable]
//! ```
//!
//! The string variants wrap the same bytes in standard, padded base64.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use super::key::{EncryptionKey, KEY_SIZE, fill_random};
use crate::error::{SecurityError, SecurityResult};

/// Nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;
/// Authentication tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// A cipher context bound to one key.
#[derive(Clone)]
pub struct CipherEngine {
    cipher: Aes256Gcm,
}

impl CipherEngine {
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Bind to raw key bytes, which must be exactly 32 bytes long.
    pub fn from_key_bytes(key: &[u8]) -> SecurityResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(SecurityError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }
        Ok(Self::new(&EncryptionKey::from_slice(key)?))
    }

    /// Encrypt with a fresh random nonce and return `nonce || sealed`.
    pub fn seal(&self, plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        fill_random(&mut nonce_bytes)?;

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            // AES-GCM only refuses plaintexts beyond its 64 GiB limit.
            .map_err(|_| SecurityError::MalformedCiphertext("plaintext too large to seal".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Authenticate and decrypt `nonce || sealed`.
    pub fn open(&self, ciphertext: &[u8]) -> SecurityResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(SecurityError::MalformedCiphertext(format!(
                "ciphertext is {} bytes, shorter than the {NONCE_SIZE}-byte nonce",
                ciphertext.len()
            )));
        }

        let (nonce, body) = ciphertext.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| SecurityError::AuthenticationFailure)
    }

    pub fn seal_string(&self, plaintext: &str) -> SecurityResult<String> {
        Ok(STANDARD.encode(self.seal(plaintext.as_bytes())?))
    }

    /// Decrypt a base64 ciphertext.
    ///
    /// Input that is not base64 is reported as `MalformedCiphertext`, so callers
    /// can tell "not ciphertext" apart from `AuthenticationFailure`.
    pub fn open_string(&self, ciphertext: &str) -> SecurityResult<String> {
        let bytes = STANDARD
            .decode(ciphertext)
            .map_err(|e| SecurityError::MalformedCiphertext(format!("invalid base64: {e}")))?;
        let plaintext = self.open(&bytes)?;
        String::from_utf8(plaintext).map_err(|_| {
            SecurityError::MalformedCiphertext("decrypted payload is not valid UTF-8".into())
        })
    }
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

/// Seal `plaintext` under raw key bytes.
pub fn seal(key: &[u8], plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
    CipherEngine::from_key_bytes(key)?.seal(plaintext)
}

/// Open `ciphertext` under raw key bytes.
pub fn open(key: &[u8], ciphertext: &[u8]) -> SecurityResult<Vec<u8>> {
    CipherEngine::from_key_bytes(key)?.open(ciphertext)
}
