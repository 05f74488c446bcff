//! # Key Manager
//!
//! Owns the working message encryption key for the lifetime of the process.
//!
//! On first use the manager loads the key from the [`SecretStore`](crate::keystore::SecretStore), or generates
//! and persists a fresh one when the store has no usable entry. Initialization
//! runs at most once per instance; concurrent first callers block on the same
//! attempt and all observe its outcome.
//!
//! Encrypt and decrypt hold the read lock for the whole call, so a rotation
//! (write lock) never swaps the key underneath an in-flight operation. The
//! lifecycle is published through a [`KeyStateMachine`] for observers.
//!
//! Rotation is destructive: there is no key-version tag, so ciphertext produced
//! before a rotation fails authentication afterwards.

use std::sync::OnceLock;

use parking_lot::RwLock;
use secllama_common::key_state::{KeyState, KeyStateMachine};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    crypto::{CipherEngine, EncryptionKey},
    error::{SecurityError, SecurityResult},
    keystore::{ENCRYPTION_KEY_ACCOUNT, SharedSecretStore},
};

struct ActiveKey {
    key: EncryptionKey,
    engine: CipherEngine,
}

impl ActiveKey {
    fn new(key: EncryptionKey) -> Self {
        let engine = CipherEngine::new(&key);
        Self { key, engine }
    }
}

pub struct KeyManager {
    store: SharedSecretStore,
    account: String,
    active: RwLock<Option<ActiveKey>>,
    init: OnceLock<SecurityResult<()>>,
    state: KeyStateMachine,
}

impl KeyManager {
    pub fn new(store: SharedSecretStore) -> Self {
        Self::with_account(store, ENCRYPTION_KEY_ACCOUNT)
    }

    pub fn with_account(store: SharedSecretStore, account: impl Into<String>) -> Self {
        Self {
            store,
            account: account.into(),
            active: RwLock::new(None),
            init: OnceLock::new(),
            state: KeyStateMachine::new(),
        }
    }

    /// Bind the working key, loading or generating it on the first call.
    ///
    /// Later calls return the first call's outcome without touching the store.
    pub fn initialize(&self) -> SecurityResult<()> {
        self.init.get_or_init(|| self.initialize_once()).clone()
    }

    fn initialize_once(&self) -> SecurityResult<()> {
        // The OnceLock guarantees a single caller reaches this point.
        let _ = self.state.begin_initializing();

        let mut active = self.active.write();
        match self.load_or_create() {
            Ok(key) => {
                *active = Some(ActiveKey::new(key));
                let _ = self.state.mark_ready();
                info!(
                    "Message encryption ready (store: {}, account: {})",
                    self.store.name(),
                    self.account
                );
                Ok(())
            }
            Err(e) => {
                error!("Message encryption initialization failed: {}", e);
                let _ = self.state.mark_failed(e.to_string());
                Err(e)
            }
        }
    }

    fn load_or_create(&self) -> SecurityResult<EncryptionKey> {
        match self.store.retrieve(&self.account) {
            Ok(key) => {
                info!("Loaded existing encryption key from {}", self.store.name());
                return Ok(key);
            }
            Err(SecurityError::NotFound { .. }) => {
                info!("No encryption key stored, generating a new one");
            }
            Err(e) => {
                warn!("Stored encryption key is unusable ({}), generating a new one", e);
            }
        }

        let key = EncryptionKey::generate()?;
        self.persist(&key)?;
        Ok(key)
    }

    fn persist(&self, key: &EncryptionKey) -> SecurityResult<()> {
        self.store.store(&self.account, key).map_err(|e| match e {
            SecurityError::PersistenceFailure { .. } => e,
            other => SecurityError::PersistenceFailure {
                account: self.account.clone(),
                reason: other.to_string(),
            },
        })
    }

    /// Encrypt a UTF-8 message to base64 ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> SecurityResult<String> {
        let active = self.active.read();
        let active = active.as_ref().ok_or(SecurityError::NotInitialized)?;
        active.engine.seal_string(plaintext)
    }

    /// Decrypt base64 ciphertext produced by [`KeyManager::encrypt`].
    pub fn decrypt(&self, ciphertext: &str) -> SecurityResult<String> {
        let active = self.active.read();
        let active = active.as_ref().ok_or(SecurityError::NotInitialized)?;
        active.engine.open_string(ciphertext)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> SecurityResult<Vec<u8>> {
        let active = self.active.read();
        let active = active.as_ref().ok_or(SecurityError::NotInitialized)?;
        active.engine.seal(plaintext)
    }

    pub fn decrypt_bytes(&self, ciphertext: &[u8]) -> SecurityResult<Vec<u8>> {
        let active = self.active.read();
        let active = active.as_ref().ok_or(SecurityError::NotInitialized)?;
        active.engine.open(ciphertext)
    }

    /// Replace the working key with a freshly generated, persisted one.
    ///
    /// On failure the previous key stays active. Returns the new generation.
    pub fn rotate(&self) -> SecurityResult<u64> {
        let mut active = self.active.write();
        let Some(current) = active.as_ref() else {
            return Err(SecurityError::NotInitialized);
        };
        self.state
            .begin_rotation()
            .map_err(|_| SecurityError::NotInitialized)?;

        let replacement = EncryptionKey::generate().and_then(|key| {
            self.persist(&key)?;
            Ok(key)
        });

        match replacement {
            Ok(key) => {
                *active = Some(ActiveKey::new(key));
                let generation = self.state.finish_rotation().unwrap_or_default();
                info!("Encryption key rotated (generation {})", generation);
                Ok(generation)
            }
            Err(e) => {
                warn!("Key rotation failed, keeping the current key: {}", e);
                // The store deletes before writing; put the active key back.
                if !self.store.exists(&self.account)
                    && let Err(restore) = self.store.store(&self.account, &current.key)
                {
                    error!("Failed to restore the active key to the store: {}", restore);
                }
                let _ = self.state.abort_rotation();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> KeyState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<KeyState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.active.read().is_some()
    }

    /// Number of completed rotations, once initialized.
    pub fn generation(&self) -> Option<u64> {
        self.state.current().generation()
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("store", &self.store.name())
            .field("account", &self.account)
            .field("state", &self.state.current())
            .finish()
    }
}
