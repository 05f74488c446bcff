//! Windows Firewall enforcement via `netsh advfirewall`.
//!
//! Windows evaluates block rules before allow rules, so a blanket outbound
//! block would also cut loopback. When localhost is allowed, the block rule's
//! remote address list therefore excludes the loopback ranges, and a separate
//! allow rule admits loopback traffic on the allowed ports.

use tracing::{debug, info};

use super::{Enforcer, LaunchCommand, SandboxError, SandboxPolicy};
use crate::command::{SharedRunner, find_in_path};

pub const MECHANISM: &str = "windows-firewall";
pub const NETSH: &str = "netsh";
pub const BLOCK_RULE: &str = "SecLlama-BlockExternal";

/// Every remote address except 127.0.0.0/8 and ::1.
pub const NON_LOOPBACK_RANGES: &str = "0.0.0.0-126.255.255.255,128.0.0.0-255.255.255.255,\
    ::2-ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff";

pub const LOOPBACK_ADDRESSES: &str = "127.0.0.1,::1";

#[derive(Debug, Clone)]
pub struct FirewallEnforcer {
    runner: SharedRunner,
    rule_name: String,
}

impl FirewallEnforcer {
    pub fn new(runner: SharedRunner) -> Self {
        Self {
            runner,
            rule_name: BLOCK_RULE.to_string(),
        }
    }

    pub fn with_rule_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = name.into();
        self
    }

    pub fn allow_rule_name(&self) -> String {
        format!("{}-AllowLocal", self.rule_name)
    }

    fn netsh(&self, args: &[&str]) -> Result<crate::command::CommandOutput, SandboxError> {
        let mut full = vec!["advfirewall", "firewall"];
        full.extend_from_slice(args);
        self.runner
            .run(NETSH, &full, None)
            .map_err(|e| SandboxError::unavailable(MECHANISM, e.to_string()))
    }

    fn delete_rule(&self, name: &str) -> Result<(), SandboxError> {
        let name_arg = format!("name={name}");
        let output = self.netsh(&["delete", "rule", name_arg.as_str()])?;
        if !output.success() {
            debug!("No existing firewall rule '{}' to delete", name);
        }
        Ok(())
    }

    fn add_rule(&self, args: &[String]) -> Result<(), SandboxError> {
        let mut full = vec!["add", "rule"];
        full.extend(args.iter().map(String::as_str));
        let output = self.netsh(&full)?;
        if output.success() {
            Ok(())
        } else {
            Err(SandboxError::partial(
                MECHANISM,
                format!(
                    "netsh refused rule (administrator rights required?): {}",
                    output.diagnostic()
                ),
            ))
        }
    }

    /// Remove both SecLlama rules. Missing rules are not an error.
    pub fn remove_rules(&self) -> Result<(), SandboxError> {
        self.delete_rule(&self.rule_name)?;
        self.delete_rule(&self.allow_rule_name())
    }
}

impl Enforcer for FirewallEnforcer {
    fn mechanism(&self) -> &'static str {
        MECHANISM
    }

    fn apply(&self, launch: &mut LaunchCommand, policy: &SandboxPolicy) -> Result<(), SandboxError> {
        let program = find_in_path(launch.get_program())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| launch.get_program().to_string());

        self.remove_rules()?;

        let mut block = vec![
            format!("name={}", self.rule_name),
            "dir=out".to_string(),
            "action=block".to_string(),
            "enable=yes".to_string(),
            "profile=any".to_string(),
            format!("program={program}"),
        ];
        if policy.allow_localhost() {
            block.push(format!("remoteip={NON_LOOPBACK_RANGES}"));
        }
        self.add_rule(&block)?;

        if policy.allow_localhost() {
            let mut allow = vec![
                format!("name={}", self.allow_rule_name()),
                "dir=out".to_string(),
                "action=allow".to_string(),
                "enable=yes".to_string(),
                "profile=any".to_string(),
                format!("program={program}"),
                format!("remoteip={LOOPBACK_ADDRESSES}"),
            ];
            let ports: Vec<String> = policy.effective_ports().map(|p| p.to_string()).collect();
            if !ports.is_empty() {
                allow.push("protocol=tcp".to_string());
                allow.push(format!("remoteport={}", ports.join(",")));
            }
            self.add_rule(&allow)?;
        }

        info!(
            "Windows firewall rules installed for {} (localhost: {})",
            program,
            policy.allow_localhost()
        );
        Ok(())
    }
}
