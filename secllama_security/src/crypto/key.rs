use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{SecurityError, SecurityResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// A 256-bit message encryption key, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from an arbitrary slice, rejecting anything but 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> SecurityResult<Self> {
        let array: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| SecurityError::InvalidKeySize {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes: array })
    }

    /// Generate a fresh random key from the OS entropy source.
    pub fn generate() -> SecurityResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        fill_random(&mut bytes)?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Decode a key as stored at the secret store boundary.
    pub fn from_base64(encoded: &str) -> SecurityResult<Self> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|e| {
            SecurityError::Serialization(format!("stored key is not valid base64: {e}"))
        })?);
        Self::from_slice(&decoded)
    }

    /// Encode the key for the secret store boundary.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("len", &KEY_SIZE)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Fill `buf` from the OS entropy source.
pub(crate) fn fill_random(buf: &mut [u8]) -> SecurityResult<()> {
    getrandom::getrandom(buf).map_err(|e| SecurityError::RandomnessUnavailable(e.to_string()))
}
