//! Landlock filesystem restriction for namespace-isolated runners.
//!
//! The ruleset is built in the parent, where failures can be reported, and only
//! `restrict_self` runs in the forked child.

use std::path::Path;

use super::{SandboxError, SandboxPolicy, launch::ChildHook};

pub const MECHANISM: &str = "landlock";

/// Child hook restricting the runner to the policy's paths.
///
/// Returns `Ok(None)` on hosts without Landlock support in this build.
#[cfg(target_os = "linux")]
pub(crate) fn child_hook(
    policy: &SandboxPolicy,
    program_dir: Option<&Path>,
) -> Result<Option<ChildHook>, SandboxError> {
    let mut ruleset = Some(build_ruleset(policy, program_dir)?);
    Ok(Some(Box::new(move || {
        if let Some(ruleset) = ruleset.take() {
            ruleset
                .restrict_self()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
        }
        Ok(())
    })))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn child_hook(
    _policy: &SandboxPolicy,
    _program_dir: Option<&Path>,
) -> Result<Option<ChildHook>, SandboxError> {
    Ok(None)
}

#[cfg(target_os = "linux")]
fn build_ruleset(
    policy: &SandboxPolicy,
    program_dir: Option<&Path>,
) -> Result<landlock::RulesetCreated, SandboxError> {
    use landlock::{ABI, Access, AccessFs, Ruleset, RulesetAttr};

    let abi = ABI::V3;
    let access_all = AccessFs::from_all(abi);
    let access_read = AccessFs::from_read(abi) | AccessFs::Execute;
    let landlock_err = |e: landlock::RulesetError| SandboxError::partial(MECHANISM, e.to_string());

    let mut ruleset = Ruleset::default()
        .handle_access(access_all)
        .map_err(landlock_err)?
        .create()
        .map_err(landlock_err)?;

    let system_paths = [
        "/usr", "/bin", "/sbin", "/etc", "/lib", "/lib64", "/sys", "/run",
    ];
    for path in system_paths {
        add_path(&mut ruleset, Path::new(path), access_read);
    }
    // unshare(1) writes the uid/gid maps; runners write to /dev/null.
    let read_write_file = access_read | AccessFs::WriteFile;
    add_path(&mut ruleset, Path::new("/proc"), read_write_file);
    add_path(&mut ruleset, Path::new("/dev"), read_write_file);

    if let Some(dir) = program_dir {
        add_path(&mut ruleset, dir, access_read);
    }
    for path in policy.allowed_read_paths() {
        add_path(&mut ruleset, path, access_read);
    }
    if let Some(dir) = policy.working_directory() {
        add_path(&mut ruleset, dir, access_all);
    }
    for path in policy.allowed_write_paths() {
        add_path(&mut ruleset, path, access_all);
    }

    Ok(ruleset)
}

#[cfg(target_os = "linux")]
fn add_path(
    ruleset: &mut landlock::RulesetCreated,
    path: &Path,
    access: landlock::BitFlags<landlock::AccessFs>,
) {
    use landlock::{PathBeneath, PathFd, RulesetCreatedAttr};

    match PathFd::new(path) {
        Ok(fd) => {
            if let Err(e) = ruleset.add_rule(PathBeneath::new(fd, access)) {
                tracing::debug!("Landlock rule for {:?} rejected: {}", path, e);
            }
        }
        Err(_) => tracing::debug!("Skipping Landlock rule for missing path {:?}", path),
    }
}

/// Whether the running kernel lists Landlock among its active LSMs.
pub fn landlock_available() -> bool {
    std::fs::read_to_string("/sys/kernel/security/lsm")
        .map(|lsm| lsm.split(',').any(|m| m.trim() == "landlock"))
        .unwrap_or(false)
}
