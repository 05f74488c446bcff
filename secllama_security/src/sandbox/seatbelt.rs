//! macOS Seatbelt enforcement via `sandbox-exec`.
//!
//! The profile is deny-by-default. Network access, when allowed at all, is
//! limited to loopback, with an explicit rule for every allowed port. The
//! generator is pure so its output can be checked on any host.

use std::{
    fmt::Write as _,
    io::Write as _,
    path::{Path, PathBuf},
};

use tracing::info;

use super::{Enforcer, LaunchCommand, SandboxError, SandboxPolicy};
use crate::command::program_directory;

pub const MECHANISM: &str = "seatbelt";
pub const SANDBOX_EXEC: &str = "/usr/bin/sandbox-exec";

/// Top-level macOS symlinks into `/private`.
const PRIVATE_ALIASES: &[&str] = &["/tmp", "/var", "/etc"];

/// System locations every runner needs to read to start at all.
const SYSTEM_READ_PATHS: &[&str] = &[
    "/System",
    "/Library",
    "/usr",
    "/bin",
    "/sbin",
    "/private/etc",
    "/private/var/db",
    "/dev",
    "/opt/homebrew",
];

#[derive(Debug, Clone)]
pub struct SeatbeltEnforcer {
    sandbox_exec: PathBuf,
    profile_dir: Option<PathBuf>,
}

impl SeatbeltEnforcer {
    pub fn new() -> Self {
        Self {
            sandbox_exec: PathBuf::from(SANDBOX_EXEC),
            profile_dir: None,
        }
    }

    /// Use a different `sandbox-exec` binary.
    pub fn with_sandbox_exec(mut self, path: impl Into<PathBuf>) -> Self {
        self.sandbox_exec = path.into();
        self
    }

    /// Write profiles into `dir` instead of the system temp directory.
    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }

    fn write_profile(&self, profile: &str) -> Result<tempfile::TempPath, SandboxError> {
        let dir = self
            .profile_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        // tempfile creates the file with mode 0600.
        let mut file = tempfile::Builder::new()
            .prefix("secllama-sandbox-")
            .suffix(".sb")
            .tempfile_in(&dir)
            .map_err(|e| SandboxError::ProfileWrite(format!("{}: {e}", dir.display())))?;
        file.write_all(profile.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| SandboxError::ProfileWrite(e.to_string()))?;
        Ok(file.into_temp_path())
    }
}

impl Default for SeatbeltEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl Enforcer for SeatbeltEnforcer {
    fn mechanism(&self) -> &'static str {
        MECHANISM
    }

    fn apply(&self, launch: &mut LaunchCommand, policy: &SandboxPolicy) -> Result<(), SandboxError> {
        if !self.sandbox_exec.exists() {
            return Err(SandboxError::unavailable(
                MECHANISM,
                format!("{} not found", self.sandbox_exec.display()),
            ));
        }

        let program_dir = program_directory(launch.get_program());
        let profile = generate_profile(policy, program_dir.as_deref());
        let profile_path = self.write_profile(&profile)?;

        let wrapper_args = ["-f".to_string(), profile_path.to_string_lossy().into_owned()];
        launch.wrap(self.sandbox_exec.to_string_lossy().into_owned(), wrapper_args);
        launch.keep_artifact(profile_path);

        info!(
            "Seatbelt profile applied (localhost: {}, ports: {:?})",
            policy.allow_localhost(),
            policy.allowed_ports()
        );
        Ok(())
    }
}

/// Render the SBPL profile for `policy`.
pub fn generate_profile(policy: &SandboxPolicy, program_dir: Option<&Path>) -> String {
    let mut sb = String::from("(version 1)\n(deny default)\n\n");

    sb.push_str(
        "(allow process*)\n\
         (allow signal)\n\
         (allow sysctl-read)\n\
         (allow mach-lookup)\n\
         (allow ipc-posix-shm*)\n\
         (allow file-read-metadata)\n\n",
    );

    sb.push_str("; reads\n");
    for path in SYSTEM_READ_PATHS {
        push_rule(&mut sb, "file-read*", "subpath", Path::new(path));
    }
    if let Some(dir) = program_dir {
        push_rule(&mut sb, "file-read*", "subpath", &seatbelt_path(dir));
    }
    if let Some(dir) = policy.working_directory() {
        push_rule(&mut sb, "file-read*", "subpath", &seatbelt_path(dir));
    }
    for path in policy
        .allowed_read_paths()
        .iter()
        .chain(policy.allowed_write_paths())
    {
        push_rule(&mut sb, "file-read*", "subpath", &seatbelt_path(path));
    }

    sb.push_str("\n; writes\n");
    if let Some(dir) = policy.working_directory() {
        push_rule(&mut sb, "file-write*", "subpath", &seatbelt_path(dir));
    }
    for path in policy.allowed_write_paths() {
        push_rule(&mut sb, "file-write*", "subpath", &seatbelt_path(path));
    }
    for path in ["/private/tmp", "/private/var/folders"] {
        push_rule(&mut sb, "file-write*", "subpath", Path::new(path));
    }
    for device in ["/dev/null", "/dev/tty", "/dev/zero"] {
        push_rule(&mut sb, "file-write*", "literal", Path::new(device));
    }

    sb.push_str("\n; network\n");
    if policy.allow_localhost() {
        sb.push_str(
            "(allow network-outbound (remote ip \"localhost:*\"))\n\
             (allow network-inbound (local ip \"localhost:*\"))\n\
             (allow network-bind (local ip \"localhost:*\"))\n\
             (allow network-outbound (remote unix-socket))\n",
        );
        for port in policy.effective_ports() {
            let _ = writeln!(
                sb,
                "(allow network-bind (local ip \"localhost:{port}\"))\n\
                 (allow network-inbound (local ip \"localhost:{port}\"))\n\
                 (allow network-outbound (remote ip \"localhost:{port}\"))"
            );
        }
    } else {
        sb.push_str("(deny network*)\n");
    }

    sb
}

/// Resolve `path` to the vnode path Seatbelt matches against.
///
/// Existing paths are canonicalized. A remaining `/tmp`, `/var` or `/etc`
/// prefix is rewritten under `/private`, which covers paths that do not
/// exist yet and hosts without those symlinks.
pub fn seatbelt_path(path: &Path) -> PathBuf {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    for alias in PRIVATE_ALIASES {
        if let Ok(rest) = resolved.strip_prefix(alias) {
            let mut private = Path::new("/private").join(alias.trim_start_matches('/'));
            if !rest.as_os_str().is_empty() {
                private.push(rest);
            }
            return private;
        }
    }
    resolved
}

fn push_rule(sb: &mut String, operation: &str, filter: &str, path: &Path) {
    let _ = writeln!(
        sb,
        "(allow {operation} ({filter} \"{}\"))",
        escape(&path.to_string_lossy())
    );
}

/// Escape a string for an SBPL string literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
