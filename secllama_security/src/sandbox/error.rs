/// Errors specific to sandbox enforcement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Sandbox enforcement via {mechanism} is incomplete: {reason}")]
    EnforcementPartial { mechanism: String, reason: String },

    #[error("Sandbox backend {mechanism} is unavailable: {reason}")]
    BackendUnavailable { mechanism: String, reason: String },

    #[error("A sandbox has already been applied to this launch")]
    AlreadyApplied,

    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Failed to write sandbox profile: {0}")]
    ProfileWrite(String),
}

impl SandboxError {
    pub(crate) fn partial(mechanism: &str, reason: impl Into<String>) -> Self {
        SandboxError::EnforcementPartial {
            mechanism: mechanism.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(mechanism: &str, reason: impl Into<String>) -> Self {
        SandboxError::BackendUnavailable {
            mechanism: mechanism.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error may be downgraded to a warning outside strict mode.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, SandboxError::AlreadyApplied)
    }
}
