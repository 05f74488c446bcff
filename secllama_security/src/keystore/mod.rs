//! # OS-Native Secret Storage
//!
//! The working encryption key lives in the platform's credential facility, never
//! on disk in the clear. Each backend drives the platform's helper binary through
//! a [`CommandRunner`](crate::command::CommandRunner), so the translation from
//! trait calls to helper invocations is testable on every host.
//!
//! ## Backends
//!
//! - **macOS**: [`KeychainStore`] over `security *-generic-password`
//! - **Linux**: [`SecretServiceStore`] over `secret-tool` (libsecret)
//! - **Windows**: [`CredentialManagerStore`] over `cmdkey` and PowerShell
//! - **Any**: [`MemorySecretStore`] for tests and hosts without a keyring
//!
//! Keys cross the store boundary as standard base64 text.

mod credential_manager;
mod keychain;
mod memory;
mod secret_service;

pub use credential_manager::CredentialManagerStore;
pub use keychain::KeychainStore;
pub use memory::MemorySecretStore;
pub use secret_service::SecretServiceStore;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::{
    command::{CommandOutput, CommandRunner, SharedRunner, SystemCommandRunner},
    crypto::EncryptionKey,
    error::{SecurityError, SecurityResult},
};

/// Service namespace under which every SecLlama secret is filed.
pub const KEYSTORE_SERVICE: &str = "secllama";

/// Account holding the message encryption key.
pub const ENCRYPTION_KEY_ACCOUNT: &str = "message-encryption-key";

/// Capability over an OS credential facility, keyed by `(service, account)`.
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Persist `key` under `account`, replacing any existing entry.
    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()>;

    /// Fetch the key under `account`.
    ///
    /// Returns `NotFound` when no entry exists and `InvalidKeySize` or
    /// `Serialization` when the entry is not a base64 32-byte key.
    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey>;

    /// Remove the entry under `account`. Deleting a missing entry succeeds.
    fn delete(&self, account: &str) -> SecurityResult<()>;

    fn exists(&self, account: &str) -> bool;
}

pub type SharedSecretStore = Arc<dyn SecretStore>;

/// Encode a key for the store boundary.
pub fn encode_key(key: &EncryptionKey) -> Zeroizing<String> {
    key.to_base64()
}

/// Decode a key read back from the store boundary.
pub fn decode_key(encoded: &str) -> SecurityResult<EncryptionKey> {
    EncryptionKey::from_base64(encoded)
}

/// The secret store for the build target, driving real helper processes.
pub fn default_secret_store() -> SecurityResult<SharedSecretStore> {
    default_secret_store_with(SystemCommandRunner::shared())
}

/// The secret store for the build target, driving helpers through `runner`.
pub fn default_secret_store_with(runner: SharedRunner) -> SecurityResult<SharedSecretStore> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(KeychainStore::new(runner)))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(SecretServiceStore::new(runner)?))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(CredentialManagerStore::new(runner)))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = runner;
        Err(SecurityError::backend(
            "none",
            format!("no OS secret store is supported on {}", std::env::consts::OS),
        ))
    }
}

/// Run a helper, mapping spawn failures and timeouts to `BackendUnavailable`.
pub(crate) fn run_helper(
    runner: &dyn CommandRunner,
    backend: &str,
    program: &str,
    args: &[&str],
    stdin: Option<&str>,
) -> SecurityResult<CommandOutput> {
    runner
        .run(program, args, stdin)
        .map_err(|e| SecurityError::backend(backend, e.to_string()))
}

pub(crate) fn persistence_failure(account: &str, output: &CommandOutput) -> SecurityError {
    SecurityError::PersistenceFailure {
        account: account.to_string(),
        reason: format!(
            "helper exited with {:?}: {}",
            output.status,
            output.diagnostic()
        ),
    }
}

pub(crate) fn not_found(account: &str) -> SecurityError {
    SecurityError::NotFound {
        account: account.to_string(),
    }
}
