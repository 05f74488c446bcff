//! In-process secret store with the same semantics as the OS backends.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{SecretStore, decode_key, encode_key, not_found};
use crate::{
    crypto::EncryptionKey,
    error::{SecurityError, SecurityResult},
};

/// Keeps base64 entries in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
    fail_writes: AtomicBool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` fail with `PersistenceFailure`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Place a raw encoded value, bypassing key validation.
    pub fn insert_raw(&self, account: &str, encoded: &str) {
        self.entries
            .lock()
            .insert(account.to_string(), Zeroizing::new(encoded.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecurityError::PersistenceFailure {
                account: account.to_string(),
                reason: "memory store is rejecting writes".to_string(),
            });
        }
        let mut entries = self.entries.lock();
        entries.remove(account);
        entries.insert(account.to_string(), encode_key(key));
        Ok(())
    }

    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey> {
        let entries = self.entries.lock();
        let encoded = entries.get(account).ok_or_else(|| not_found(account))?;
        decode_key(encoded.as_str())
    }

    fn delete(&self, account: &str) -> SecurityResult<()> {
        self.entries.lock().remove(account);
        Ok(())
    }

    fn exists(&self, account: &str) -> bool {
        self.entries.lock().contains_key(account)
    }
}
