//! Boolean environment toggles.
//!
//! Every SecLlama switch defaults to `true` when unset or blank. A variable that
//! is set to anything other than a truthy value (`1`, `true`, `yes`, `on`, `t`)
//! turns the feature off.

/// Toggle for at-rest message and history encryption.
pub const ENABLE_ENCRYPTION: &str = "SECLLAMA_ENABLE_ENCRYPTION";

/// Toggle for runner subprocess sandboxing.
pub const ENABLE_SANDBOX: &str = "SECLLAMA_ENABLE_SANDBOX";

/// Toggle that upgrades degraded isolation/encryption from warnings to errors.
pub const STRICT_NETWORK_ISOLATION: &str = "SECLLAMA_STRICT_NETWORK_ISOLATION";

/// Parse a single toggle value.
///
/// Returns `None` for an unset or blank value so callers can apply their default.
pub fn parse_flag(value: Option<&str>) -> Option<bool> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "on"
    ))
}

/// Resolve a toggle through an arbitrary lookup, defaulting to `default`.
pub fn flag_from_lookup<F>(lookup: F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    parse_flag(lookup(name).as_deref()).unwrap_or(default)
}

/// Resolve a toggle from the process environment, defaulting to `true`.
pub fn env_flag_enabled(name: &str) -> bool {
    flag_from_lookup(|key| std::env::var(key).ok(), name, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_unset_and_blank_use_default() {
        assert_eq!(parse_flag(None), None);
        assert_eq!(parse_flag(Some("")), None);
        assert_eq!(parse_flag(Some("   ")), None);
    }

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "TRUE", "True", "yes", "on", "t", " true "] {
            assert_eq!(parse_flag(Some(value)), Some(true), "value {value:?}");
        }
    }

    #[test]
    fn test_anything_else_is_false() {
        for value in ["0", "false", "no", "off", "maybe", "2"] {
            assert_eq!(parse_flag(Some(value)), Some(false), "value {value:?}");
        }
    }

    #[test]
    fn test_flag_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENABLE_SANDBOX, "false"), (ENABLE_ENCRYPTION, "")]);
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());

        assert!(!flag_from_lookup(lookup, ENABLE_SANDBOX, true));
        assert!(flag_from_lookup(lookup, ENABLE_ENCRYPTION, true));
        assert!(flag_from_lookup(lookup, STRICT_NETWORK_ISOLATION, true));
        assert!(!flag_from_lookup(lookup, STRICT_NETWORK_ISOLATION, false));
    }

    #[test]
    fn test_unset_environment_flag_is_enabled() {
        assert!(env_flag_enabled("SECLLAMA_FLAG_THAT_IS_NEVER_SET"));
    }
}
