//! Process-wide security toggles.

use secllama_common::env::{
    ENABLE_ENCRYPTION, ENABLE_SANDBOX, STRICT_NETWORK_ISOLATION, env_flag_enabled,
    flag_from_lookup,
};

/// Security toggles, each enabled unless its variable is set to a non-truthy value.
///
/// | Variable | Field |
/// |---|---|
/// | `SECLLAMA_ENABLE_ENCRYPTION` | `enable_encryption` |
/// | `SECLLAMA_ENABLE_SANDBOX` | `enable_sandbox` |
/// | `SECLLAMA_STRICT_NETWORK_ISOLATION` | `strict_network_isolation` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    pub enable_encryption: bool,
    pub enable_sandbox: bool,
    /// Upgrade degraded encryption or sandboxing into hard failures
    pub strict_network_isolation: bool,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self {
            enable_encryption: env_flag_enabled(ENABLE_ENCRYPTION),
            enable_sandbox: env_flag_enabled(ENABLE_SANDBOX),
            strict_network_isolation: env_flag_enabled(STRICT_NETWORK_ISOLATION),
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            enable_encryption: flag_from_lookup(&lookup, ENABLE_ENCRYPTION, true),
            enable_sandbox: flag_from_lookup(&lookup, ENABLE_SANDBOX, true),
            strict_network_isolation: flag_from_lookup(&lookup, STRICT_NETWORK_ISOLATION, true),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_encryption: true,
            enable_sandbox: true,
            strict_network_isolation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SecurityConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SecurityConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_enabled() {
        assert_eq!(config(&[]), SecurityConfig::default());
    }

    #[test]
    fn test_non_truthy_values_disable() {
        let cfg = config(&[
            (ENABLE_ENCRYPTION, "0"),
            (ENABLE_SANDBOX, "banana"),
            (STRICT_NETWORK_ISOLATION, "TRUE"),
        ]);
        assert!(!cfg.enable_encryption);
        assert!(!cfg.enable_sandbox);
        assert!(cfg.strict_network_isolation);
    }

    #[test]
    fn test_blank_value_keeps_default() {
        assert!(config(&[(ENABLE_SANDBOX, "  ")]).enable_sandbox);
    }

    #[test]
    fn test_from_env_reads_the_process_environment() {
        assert_eq!(
            SecurityConfig::from_env(),
            SecurityConfig::from_lookup(|name| std::env::var(name).ok())
        );
    }
}
