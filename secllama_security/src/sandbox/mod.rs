//! # Runner Process Sandboxing
//!
//! Model runners are untrusted children of the SecLlama process. Before one is
//! spawned, a declarative [`SandboxPolicy`] is translated into the platform's
//! own isolation mechanism, primarily to keep the runner off every network but
//! loopback.
//!
//! ## Platform Support
//!
//! - **macOS**: Seatbelt profile applied through `sandbox-exec`.
//! - **Linux**: a fresh network namespace (direct `unshare(2)` or `unshare(1)`),
//!   plus a Landlock filesystem ruleset where the kernel supports it.
//! - **Windows**: outbound Windows Firewall rules scoped to the runner binary.
//!
//! All three strategies compile on every host so their translation logic can be
//! tested anywhere; [`platform_enforcer`] picks the one for the build target.
//!
//! Enforcement is best effort and loud: a mechanism that cannot be applied is
//! reported as [`EnforcementOutcome::Degraded`], never as success, and strict
//! mode turns that into an error. A mechanism that holds while part of the
//! policy does not is reported as [`EnforcementOutcome::Partial`].

mod enforcer;
mod error;
mod firewall;
mod landlock;
mod launch;
mod namespace;
mod policy;
mod prerequisites;
mod seatbelt;

pub use enforcer::{
    EnforcementOutcome, Enforcer, NoopEnforcer, SandboxPreparer, apply_sandbox, platform_enforcer,
};
pub use error::SandboxError;
pub use firewall::{FirewallEnforcer, LOOPBACK_ADDRESSES, NON_LOOPBACK_RANGES};
pub use landlock::landlock_available;
pub use launch::{ChildHook, LaunchCommand, SandboxedChild};
pub use namespace::{NamespaceEnforcer, is_privileged, unshare_flags};
pub use policy::{SandboxPolicy, SandboxPolicyBuilder};
pub use prerequisites::{
    check_firewall_available, check_landlock_available, check_namespace_available,
    check_sandbox_exec_available, check_sandbox_prerequisites, kernel_supports_landlock,
};
pub use seatbelt::{SeatbeltEnforcer, generate_profile, seatbelt_path};
