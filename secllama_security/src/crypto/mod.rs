//! Authenticated message encryption.
//!
//! - [`cipher`]: AES-256-GCM seal/open with a random 96-bit nonce per call
//! - [`kdf`]: PBKDF2-HMAC-SHA256 password derivation and random key material
//! - [`key`]: the zeroizing 32-byte key type

pub mod cipher;
pub mod kdf;
pub mod key;

pub use cipher::{CipherEngine, NONCE_SIZE, TAG_SIZE, open, seal};
pub use kdf::{PBKDF2_ITERATIONS, SALT_SIZE, derive_key, generate_key, generate_salt};
pub use key::{EncryptionKey, KEY_SIZE};
