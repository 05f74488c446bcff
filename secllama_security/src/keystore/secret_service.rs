//! Linux Secret Service backend over `secret-tool` (gnome-keyring, KWallet).

use tracing::debug;

use super::{
    KEYSTORE_SERVICE, SecretStore, decode_key, encode_key, not_found, persistence_failure,
    run_helper,
};
use crate::{
    command::SharedRunner,
    crypto::EncryptionKey,
    error::{SecurityError, SecurityResult},
};

const BACKEND: &str = "secret-service";
const SECRET_TOOL: &str = "secret-tool";

pub(crate) const INSTALL_HINT: &str =
    "secret-tool not found; install the libsecret-tools package (e.g. `apt install libsecret-tools`)";

#[derive(Debug, Clone)]
pub struct SecretServiceStore {
    runner: SharedRunner,
    service: String,
}

impl SecretServiceStore {
    /// Fails with `BackendUnavailable` when `secret-tool` is not installed.
    pub fn new(runner: SharedRunner) -> SecurityResult<Self> {
        Self::with_service(runner, KEYSTORE_SERVICE)
    }

    pub fn with_service(runner: SharedRunner, service: impl Into<String>) -> SecurityResult<Self> {
        if !runner.is_available(SECRET_TOOL) {
            return Err(SecurityError::backend(BACKEND, INSTALL_HINT));
        }
        Ok(Self {
            runner,
            service: service.into(),
        })
    }

    fn lookup_args<'a>(&'a self, account: &'a str) -> [&'a str; 5] {
        ["lookup", "service", self.service.as_str(), "account", account]
    }
}

impl SecretStore for SecretServiceStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()> {
        self.delete(account)?;

        let label = format!("SecLlama {account}");
        let encoded = encode_key(key);
        // The secret goes through stdin so it never shows up in the process list.
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECRET_TOOL,
            &[
                "store",
                "--label",
                label.as_str(),
                "service",
                self.service.as_str(),
                "account",
                account,
            ],
            Some(encoded.as_str()),
        )?;

        if !output.success() {
            return Err(persistence_failure(account, &output));
        }
        debug!("Stored key for account '{}' in secret service", account);
        Ok(())
    }

    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey> {
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECRET_TOOL,
            &self.lookup_args(account),
            None,
        )?;

        // secret-tool exits 1 with empty output for a missing item; anything
        // on stderr is a D-Bus or collection error.
        if !output.success() && !output.stderr.trim().is_empty() {
            return Err(SecurityError::backend(
                BACKEND,
                format!("secret-tool lookup failed: {}", output.diagnostic()),
            ));
        }
        if !output.success() || output.stdout.trim().is_empty() {
            return Err(not_found(account));
        }
        decode_key(&output.stdout)
    }

    fn delete(&self, account: &str) -> SecurityResult<()> {
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECRET_TOOL,
            &["clear", "service", self.service.as_str(), "account", account],
            None,
        )?;
        if !output.success() {
            debug!(
                "secret-tool clear for '{}' exited with {:?}",
                account, output.status
            );
        }
        Ok(())
    }

    fn exists(&self, account: &str) -> bool {
        run_helper(
            self.runner.as_ref(),
            BACKEND,
            SECRET_TOOL,
            &self.lookup_args(account),
            None,
        )
        .is_ok_and(|output| output.success() && !output.stdout.trim().is_empty())
    }
}
