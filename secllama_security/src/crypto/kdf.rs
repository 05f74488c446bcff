//! Password-based key derivation (PBKDF2-HMAC-SHA256).

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::key::{EncryptionKey, KEY_SIZE, fill_random};
use crate::error::SecurityResult;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_SIZE: usize = 32;

/// Derive a 32-byte key from `password` and a 32-byte `salt`.
///
/// # Panics
///
/// Panics if `salt` is not exactly [`SALT_SIZE`] bytes.
pub fn derive_key(password: &str, salt: &[u8]) -> EncryptionKey {
    assert_eq!(
        salt.len(),
        SALT_SIZE,
        "salt must be exactly {SALT_SIZE} bytes"
    );

    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    let key = EncryptionKey::from_bytes(out);
    out.zeroize();
    key
}

pub fn generate_salt() -> SecurityResult<[u8; SALT_SIZE]> {
    let mut salt = [0u8; SALT_SIZE];
    fill_random(&mut salt)?;
    Ok(salt)
}

pub fn generate_key() -> SecurityResult<EncryptionKey> {
    EncryptionKey::generate()
}
