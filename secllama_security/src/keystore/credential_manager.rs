//! Windows Credential Manager backend.
//!
//! `cmdkey` can write and delete generic credentials but cannot read a secret
//! back, so retrieval and existence checks run a non-interactive PowerShell
//! script over the `CredentialManager` module.

use tracing::debug;

use super::{
    KEYSTORE_SERVICE, SecretStore, decode_key, encode_key, not_found, persistence_failure,
    run_helper,
};
use crate::{
    command::{CommandOutput, SharedRunner},
    crypto::EncryptionKey,
    error::{SecurityError, SecurityResult},
};

const BACKEND: &str = "credential-manager";
const CMDKEY: &str = "cmdkey";
const POWERSHELL: &str = "powershell";

/// Script exit code when the credential is absent.
const MISSING_CREDENTIAL_EXIT: i32 = 1;
/// Script exit code when the `CredentialManager` module is not installed.
const MISSING_MODULE_EXIT: i32 = 3;

pub(crate) const MODULE_HINT: &str = "PowerShell module 'CredentialManager' is not installed; run `Install-Module CredentialManager -Scope CurrentUser`";

#[derive(Debug, Clone)]
pub struct CredentialManagerStore {
    runner: SharedRunner,
    service: String,
}

impl CredentialManagerStore {
    pub fn new(runner: SharedRunner) -> Self {
        Self::with_service(runner, KEYSTORE_SERVICE)
    }

    pub fn with_service(runner: SharedRunner, service: impl Into<String>) -> Self {
        Self {
            runner,
            service: service.into(),
        }
    }

    /// Generic credential target, `service/account`.
    pub fn target_name(&self, account: &str) -> String {
        format!("{}/{}", self.service, account)
    }

    fn run_script(&self, account: &str, on_found: &str) -> SecurityResult<CommandOutput> {
        let script = credential_script(&self.target_name(account), on_found);
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            POWERSHELL,
            &["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
            None,
        )?;
        if output.status == Some(MISSING_MODULE_EXIT) {
            return Err(SecurityError::backend(BACKEND, MODULE_HINT));
        }
        Ok(output)
    }
}

/// Build the lookup script; `on_found` runs with `$cred` bound.
pub(crate) fn credential_script(target: &str, on_found: &str) -> String {
    format!(
        "if (-not (Get-Module -ListAvailable -Name CredentialManager)) {{ exit {MISSING_MODULE_EXIT} }}\n\
         Import-Module CredentialManager\n\
         $cred = Get-StoredCredential -Target {} -ErrorAction SilentlyContinue\n\
         if ($cred) {{ {on_found} }} else {{ exit {MISSING_CREDENTIAL_EXIT} }}",
        quote_powershell(target)
    )
}

/// Single-quoted PowerShell literal; only `'` needs escaping.
fn quote_powershell(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl SecretStore for CredentialManagerStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()> {
        self.delete(account)?;

        let encoded = encode_key(key);
        let generic = format!("/generic:{}", self.target_name(account));
        let user = format!("/user:{account}");
        let pass = zeroize::Zeroizing::new(format!("/pass:{}", encoded.as_str()));
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            CMDKEY,
            &[generic.as_str(), user.as_str(), pass.as_str()],
            None,
        )?;

        if !output.success() {
            return Err(persistence_failure(account, &output));
        }
        debug!("Stored key for account '{}' in credential manager", account);
        Ok(())
    }

    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey> {
        let output = self.run_script(account, "$cred.GetNetworkCredential().Password")?;
        match output.status {
            Some(0) if !output.stdout.trim().is_empty() => decode_key(&output.stdout),
            Some(0) | Some(MISSING_CREDENTIAL_EXIT) => Err(not_found(account)),
            _ => Err(SecurityError::backend(
                BACKEND,
                format!("credential lookup failed: {}", output.diagnostic()),
            )),
        }
    }

    fn delete(&self, account: &str) -> SecurityResult<()> {
        let target = format!("/delete:{}", self.target_name(account));
        let output = run_helper(
            self.runner.as_ref(),
            BACKEND,
            CMDKEY,
            &[target.as_str()],
            None,
        )?;
        if !output.success() {
            debug!("cmdkey delete for '{}' exited with {:?}", account, output.status);
        }
        Ok(())
    }

    fn exists(&self, account: &str) -> bool {
        self.run_script(account, "exit 0")
            .is_ok_and(|output| output.success())
    }
}
