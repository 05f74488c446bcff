//! macOS Keychain backend over the `security` CLI.

use tracing::{debug, warn};

use super::{
    KEYSTORE_SERVICE, SecretStore, decode_key, encode_key, not_found, persistence_failure,
    run_helper,
};
use crate::{
    command::SharedRunner,
    crypto::EncryptionKey,
    error::{SecurityError, SecurityResult},
};

const BACKEND: &str = "keychain";
const SECURITY: &str = "security";

/// `security` exits with this code when no matching item exists.
pub(crate) const ITEM_NOT_FOUND_EXIT: i32 = 44;

/// Keychain generic-password items under one service name.
///
/// `security add-generic-password` only accepts the secret through `-w`, so
/// the base64 key is visible in the process table while the write runs.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    runner: SharedRunner,
    service: String,
}

impl KeychainStore {
    pub fn new(runner: SharedRunner) -> Self {
        Self::with_service(runner, KEYSTORE_SERVICE)
    }

    pub fn with_service(runner: SharedRunner, service: impl Into<String>) -> Self {
        Self {
            runner,
            service: service.into(),
        }
    }
}

impl SecretStore for KeychainStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    /// Replaces any existing item. The key travels on argv as `-w <base64>`.
    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()> {
        self.delete(account)?;

        let encoded = encode_key(key);
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECURITY,
            &[
                "add-generic-password",
                "-s",
                self.service.as_str(),
                "-a",
                account,
                "-w",
                encoded.as_str(),
                "-U",
            ],
            None,
        )?;

        if !output.success() {
            return Err(persistence_failure(account, &output));
        }
        debug!("Stored key for account '{}' in keychain", account);
        Ok(())
    }

    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey> {
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECURITY,
            &["find-generic-password", "-s", self.service.as_str(), "-a", account, "-w"],
            None,
        )?;

        match output.status {
            Some(0) => decode_key(&output.stdout),
            Some(ITEM_NOT_FOUND_EXIT) => Err(not_found(account)),
            _ => Err(SecurityError::backend(
                BACKEND,
                format!("keychain lookup failed: {}", output.diagnostic()),
            )),
        }
    }

    fn delete(&self, account: &str) -> SecurityResult<()> {
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECURITY,
            &["delete-generic-password", "-s", self.service.as_str(), "-a", account],
            None,
        )?;

        match output.status {
            Some(0) | Some(ITEM_NOT_FOUND_EXIT) => Ok(()),
            _ => {
                warn!(
                    "Keychain delete for '{}' exited with {:?}: {}",
                    account,
                    output.status,
                    output.diagnostic()
                );
                Ok(())
            }
        }
    }

    fn exists(&self, account: &str) -> bool {
        run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECURITY,
            &["find-generic-password", "-s", self.service.as_str(), "-a", account],
            None,
        )
        .is_ok_and(|output| output.success())
    }
}
