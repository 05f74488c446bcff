//! Linux network namespace enforcement.
//!
//! A privileged parent detaches the child into a fresh network namespace with
//! `unshare(CLONE_NEWNET)` right before `exec`. Otherwise the launch is wrapped
//! in `unshare(1)`, mapping the caller to root inside a new user namespace so
//! no privileges are required. The new namespace has no external interfaces.
//!
//! Loopback inside the namespace is separate from the host's, so a runner
//! isolated this way cannot be reached on the host's `localhost`.

use tracing::{info, warn};

use super::{Enforcer, LaunchCommand, SandboxError, SandboxPolicy, landlock, launch::ChildHook};
use crate::command::{SharedRunner, program_directory};

pub const MECHANISM: &str = "network-namespace";
pub const UNSHARE: &str = "unshare";

#[derive(Debug, Clone)]
pub struct NamespaceEnforcer {
    runner: SharedRunner,
    privileged: bool,
    landlock: bool,
}

impl NamespaceEnforcer {
    pub fn new(runner: SharedRunner) -> Self {
        Self {
            runner,
            privileged: is_privileged(),
            landlock: true,
        }
    }

    /// Override privilege detection.
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Also confine the filesystem with Landlock (default on).
    pub fn with_landlock(mut self, enabled: bool) -> Self {
        self.landlock = enabled;
        self
    }

    fn isolate_network(&self, launch: &mut LaunchCommand) -> Result<(), SandboxError> {
        #[cfg(target_os = "linux")]
        if self.privileged {
            launch.push_child_hook(Box::new(|| {
                nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNET)
                    .map_err(std::io::Error::from)
            }));
            return Ok(());
        }

        if !self.runner.is_available(UNSHARE) {
            return Err(SandboxError::partial(
                MECHANISM,
                "not privileged and unshare(1) is not installed",
            ));
        }

        let flags = unshare_flags(self.privileged);
        let mut trial: Vec<&str> = flags.to_vec();
        trial.push("true");
        let output = self
            .runner
            .run(UNSHARE, &trial, None)
            .map_err(|e| SandboxError::partial(MECHANISM, e.to_string()))?;
        if !output.success() {
            return Err(SandboxError::partial(
                MECHANISM,
                format!("unshare trial run failed: {}", output.diagnostic()),
            ));
        }

        launch.wrap(UNSHARE, flags.iter().copied());
        Ok(())
    }
}

/// Install the Landlock hook, or record the gap it leaves.
fn attach_filesystem_confinement(
    launch: &mut LaunchCommand,
    hook: Result<Option<ChildHook>, SandboxError>,
) {
    match hook {
        Ok(Some(hook)) => launch.push_child_hook(hook),
        Ok(None) => {}
        Err(e) => {
            warn!("Filesystem confinement not applied: {}", e);
            launch.record_gap(format!("filesystem confinement not applied: {e}"));
        }
    }
}

/// `unshare(1)` arguments placed before the wrapped program.
pub fn unshare_flags(privileged: bool) -> &'static [&'static str] {
    if privileged {
        &["--net", "--"]
    } else {
        &["--user", "--map-root-user", "--net", "--"]
    }
}

impl Enforcer for NamespaceEnforcer {
    fn mechanism(&self) -> &'static str {
        MECHANISM
    }

    fn apply(&self, launch: &mut LaunchCommand, policy: &SandboxPolicy) -> Result<(), SandboxError> {
        // Resolve before wrapping so the rule covers the runner, not unshare.
        let program_dir = program_directory(launch.get_program());

        self.isolate_network(launch)?;
        launch.set_network_namespace();

        if self.landlock {
            attach_filesystem_confinement(
                launch,
                landlock::child_hook(policy, program_dir.as_deref()),
            );
        }

        if policy.allow_localhost() {
            warn!(
                "Runner loopback is isolated from the host; ports {:?} are only reachable inside its namespace",
                policy.allowed_ports()
            );
        }
        info!(
            "Network namespace isolation applied ({})",
            if self.privileged { "direct" } else { "unshare" }
        );
        Ok(())
    }
}

/// Whether this process may create namespaces without a user namespace.
pub fn is_privileged() -> bool {
    #[cfg(target_os = "linux")]
    {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_landlock_ruleset_is_recorded_as_gap() {
        let mut launch = LaunchCommand::new("llama-server");
        attach_filesystem_confinement(
            &mut launch,
            Err(SandboxError::partial(landlock::MECHANISM, "ruleset rejected")),
        );

        assert_eq!(launch.child_hook_count(), 0);
        assert_eq!(launch.confinement_gaps().len(), 1);
        assert!(launch.confinement_gaps()[0].contains("ruleset rejected"));
    }

    #[test]
    fn test_installed_landlock_hook_leaves_no_gap() {
        let mut launch = LaunchCommand::new("llama-server");
        attach_filesystem_confinement(&mut launch, Ok(Some(Box::new(|| Ok(())))));

        assert_eq!(launch.child_hook_count(), 1);
        assert!(launch.confinement_gaps().is_empty());
    }
}
