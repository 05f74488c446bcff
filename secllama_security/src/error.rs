//! Error taxonomy for the key, cipher, store and codec layers.
//!
//! Sandbox enforcement has its own error type in [`crate::sandbox::SandboxError`].

/// Errors produced by key management, encryption and the secret store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Authentication failed: ciphertext was tampered with or encrypted under a different key")]
    AuthenticationFailure,

    #[error("Encryption key is not initialized")]
    NotInitialized,

    #[error("Secret store backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Failed to persist key for account '{account}': {reason}")]
    PersistenceFailure { account: String, reason: String },

    #[error("No key stored for account '{account}'")]
    NotFound { account: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SecurityError {
    /// Availability errors may be downgraded to warnings at boundary components.
    pub fn is_availability_error(&self) -> bool {
        matches!(
            self,
            SecurityError::NotInitialized
                | SecurityError::BackendUnavailable { .. }
                | SecurityError::PersistenceFailure { .. }
        )
    }

    /// Integrity errors: the key or the ciphertext itself is bad.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            SecurityError::AuthenticationFailure | SecurityError::InvalidKeySize { .. }
        )
    }

    pub(crate) fn backend(backend: &str, reason: impl Into<String>) -> Self {
        SecurityError::BackendUnavailable {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SecurityError {
    fn from(err: serde_json::Error) -> Self {
        SecurityError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SecurityError {
    fn from(err: std::io::Error) -> Self {
        SecurityError::Io(err.to_string())
    }
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
