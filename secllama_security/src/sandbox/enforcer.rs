use std::sync::Arc;

use tracing::{info, warn};

use super::{
    FirewallEnforcer, LaunchCommand, NamespaceEnforcer, SandboxError, SandboxPolicy,
    SeatbeltEnforcer,
};
use crate::{command::SharedRunner, config::SecurityConfig};

/// Translates a [`SandboxPolicy`] into an OS mechanism on a pending launch.
pub trait Enforcer: Send + Sync + std::fmt::Debug {
    fn mechanism(&self) -> &'static str;

    /// Rewrite `launch` so the spawned child is confined by `policy`.
    ///
    /// On error the launch must be left runnable; it is then started unconfined
    /// or not at all, depending on strict mode.
    fn apply(&self, launch: &mut LaunchCommand, policy: &SandboxPolicy) -> Result<(), SandboxError>;
}

/// What happened when a sandbox was requested for a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementOutcome {
    Applied { mechanism: &'static str },
    /// The mechanism is in place but part of the policy is not enforced
    Partial {
        mechanism: &'static str,
        gaps: Vec<String>,
    },
    /// The mechanism failed and the launch proceeds without it
    Degraded { reason: String },
    /// Sandboxing is switched off
    Disabled,
}

impl EnforcementOutcome {
    /// Whether the mechanism confines the launch, fully or in part.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            EnforcementOutcome::Applied { .. } | EnforcementOutcome::Partial { .. }
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, EnforcementOutcome::Applied { .. })
    }
}

/// Enforcer for hosts without a supported mechanism.
#[derive(Debug, Clone, Default)]
pub struct NoopEnforcer;

impl Enforcer for NoopEnforcer {
    fn mechanism(&self) -> &'static str {
        "none"
    }

    fn apply(&self, _launch: &mut LaunchCommand, _policy: &SandboxPolicy) -> Result<(), SandboxError> {
        Err(SandboxError::UnsupportedOs(std::env::consts::OS.to_string()))
    }
}

/// Apply `policy` to `launch` once, before it is spawned.
///
/// Failures are reported as [`EnforcementOutcome::Degraded`] unless `strict`
/// is set. A mechanism that applied with gaps is reported as
/// [`EnforcementOutcome::Partial`]. A second call on the same launch is always
/// an error.
pub fn apply_sandbox(
    launch: &mut LaunchCommand,
    policy: &SandboxPolicy,
    enforcer: &dyn Enforcer,
    strict: bool,
) -> Result<EnforcementOutcome, SandboxError> {
    if launch.is_sandbox_attempted() {
        return Err(SandboxError::AlreadyApplied);
    }
    launch.mark_attempted();

    match enforcer.apply(launch, policy) {
        Ok(()) => {
            let mechanism = enforcer.mechanism();
            launch.mark_sandboxed(mechanism);
            let gaps = launch.confinement_gaps().to_vec();
            if gaps.is_empty() {
                info!("Runner sandboxed with {}", mechanism);
                return Ok(EnforcementOutcome::Applied { mechanism });
            }
            warn!(
                "Runner sandboxed with {} but not fully confined: {}",
                mechanism,
                gaps.join("; ")
            );
            Ok(EnforcementOutcome::Partial { mechanism, gaps })
        }
        Err(e) if strict || !e.is_degradable() => Err(e),
        Err(e) => {
            warn!("Runner starts without full isolation: {}", e);
            Ok(EnforcementOutcome::Degraded {
                reason: e.to_string(),
            })
        }
    }
}

/// The enforcer for the build target.
pub fn platform_enforcer(runner: SharedRunner) -> Arc<dyn Enforcer> {
    if cfg!(target_os = "macos") {
        Arc::new(SeatbeltEnforcer::new())
    } else if cfg!(target_os = "linux") {
        Arc::new(NamespaceEnforcer::new(runner))
    } else if cfg!(target_os = "windows") {
        Arc::new(FirewallEnforcer::new(runner))
    } else {
        Arc::new(NoopEnforcer)
    }
}

/// An enforcer bundled with the sandbox toggles, used at every runner launch.
#[derive(Debug, Clone)]
pub struct SandboxPreparer {
    enforcer: Arc<dyn Enforcer>,
    enabled: bool,
    strict: bool,
}

impl SandboxPreparer {
    pub fn new(enforcer: Arc<dyn Enforcer>, enabled: bool, strict: bool) -> Self {
        Self {
            enforcer,
            enabled,
            strict,
        }
    }

    pub fn from_config(config: &SecurityConfig, runner: SharedRunner) -> Self {
        Self::new(
            platform_enforcer(runner),
            config.enable_sandbox,
            config.strict_network_isolation,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn mechanism(&self) -> &'static str {
        self.enforcer.mechanism()
    }

    pub fn prepare(
        &self,
        launch: &mut LaunchCommand,
        policy: &SandboxPolicy,
    ) -> Result<EnforcementOutcome, SandboxError> {
        if !self.enabled {
            warn!("Sandboxing disabled; runner starts unconfined");
            return Ok(EnforcementOutcome::Disabled);
        }
        apply_sandbox(launch, policy, self.enforcer.as_ref(), self.strict)
    }
}
