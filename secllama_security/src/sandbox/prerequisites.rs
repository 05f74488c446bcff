use super::{SandboxError, firewall, landlock, namespace, seatbelt};
use crate::command::CommandRunner;

/// Check that the platform's sandbox mechanism can be used on this host.
///
/// Returns the mechanism name on success.
pub fn check_sandbox_prerequisites(runner: &dyn CommandRunner) -> Result<&'static str, SandboxError> {
    #[cfg(target_os = "linux")]
    {
        check_namespace_available(runner)
    }

    #[cfg(target_os = "macos")]
    {
        check_sandbox_exec_available(runner)
    }

    #[cfg(target_os = "windows")]
    {
        check_firewall_available(runner)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = runner;
        Err(SandboxError::UnsupportedOs(std::env::consts::OS.to_string()))
    }
}

pub fn check_namespace_available(runner: &dyn CommandRunner) -> Result<&'static str, SandboxError> {
    if namespace::is_privileged() || runner.is_available(namespace::UNSHARE) {
        Ok(namespace::MECHANISM)
    } else {
        Err(SandboxError::unavailable(
            namespace::MECHANISM,
            "unshare(1) not found; install util-linux",
        ))
    }
}

/// Landlock is listed as an active LSM, or the kernel is new enough to have it.
pub fn check_landlock_available(runner: &dyn CommandRunner) -> Result<(), SandboxError> {
    if landlock::landlock_available() {
        return Ok(());
    }

    let output = runner
        .run("uname", &["-r"], None)
        .map_err(|e| SandboxError::unavailable(landlock::MECHANISM, e.to_string()))?;
    let release = output.stdout.trim();
    if kernel_supports_landlock(release) {
        Ok(())
    } else {
        Err(SandboxError::unavailable(
            landlock::MECHANISM,
            format!("Landlock requires Linux kernel 5.13 or newer. Current: {release}."),
        ))
    }
}

/// Parse a `uname -r` release such as `6.8.0-45-generic`.
pub fn kernel_supports_landlock(release: &str) -> bool {
    let mut parts = release.trim().split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts
        .next()
        .and_then(|p| p.split('-').next())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    major > 5 || (major == 5 && minor >= 13)
}

/// `sandbox-exec` exists and can apply a profile here.
///
/// Applying fails when this process already runs inside a sandbox.
pub fn check_sandbox_exec_available(runner: &dyn CommandRunner) -> Result<&'static str, SandboxError> {
    if !std::path::Path::new(seatbelt::SANDBOX_EXEC).exists() {
        return Err(SandboxError::unavailable(
            seatbelt::MECHANISM,
            "sandbox-exec is not available",
        ));
    }

    let output = runner
        .run(
            seatbelt::SANDBOX_EXEC,
            &["-p", "(version 1)(allow default)", "/usr/bin/true"],
            None,
        )
        .map_err(|e| SandboxError::unavailable(seatbelt::MECHANISM, e.to_string()))?;
    if output.success() {
        Ok(seatbelt::MECHANISM)
    } else {
        tracing::debug!("sandbox-exec test failed: {}", output.diagnostic());
        Err(SandboxError::unavailable(
            seatbelt::MECHANISM,
            "nested sandbox detected; sandbox-exec cannot apply a profile from here",
        ))
    }
}

pub fn check_firewall_available(runner: &dyn CommandRunner) -> Result<&'static str, SandboxError> {
    if runner.is_available(firewall::NETSH) {
        Ok(firewall::MECHANISM)
    } else {
        Err(SandboxError::unavailable(
            firewall::MECHANISM,
            "netsh is not available",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_parsing() {
        assert!(kernel_supports_landlock("6.8.0-45-generic"));
        assert!(kernel_supports_landlock("5.13.0"));
        assert!(!kernel_supports_landlock("5.12.19-1"));
        assert!(!kernel_supports_landlock("4.19.0"));
        assert!(!kernel_supports_landlock("garbage"));
    }
}
