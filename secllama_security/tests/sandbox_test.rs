//! Sandbox policy translation and the apply-once enforcement contract.

use std::sync::Arc;

use secllama_security::{
    SandboxError,
    command::CommandOutput,
    sandbox::{
        EnforcementOutcome, Enforcer, FirewallEnforcer, LOOPBACK_ADDRESSES, LaunchCommand,
        NON_LOOPBACK_RANGES, NamespaceEnforcer, NoopEnforcer, SandboxPolicy, SandboxPreparer,
        SeatbeltEnforcer, apply_sandbox, generate_profile, unshare_flags,
    },
    test_utils::ScriptedRunner,
};

fn runner_policy() -> SandboxPolicy {
    SandboxPolicy::builder()
        .allow_localhost(true)
        .allow_port(11434)
        .working_directory("/tmp/secllama")
        .allow_write("/tmp/secllama")
        .build()
}

fn launch() -> LaunchCommand {
    LaunchCommand::new("llama-server").args(["--port", "11434"])
}

// --- Seatbelt profile ---

#[test]
fn test_seatbelt_profile_allows_only_loopback_port() {
    let profile = generate_profile(&runner_policy(), None);

    assert!(profile.starts_with("(version 1)\n(deny default)"));
    assert!(profile.contains(r#"(allow network-outbound (remote ip "localhost:11434"))"#));
    assert!(profile.contains(r#"(allow network-bind (local ip "localhost:11434"))"#));
    assert!(profile.contains(r#"(allow file-write* (subpath "/private/tmp/secllama"))"#));
    assert!(!profile.contains(r#"(subpath "/tmp/secllama")"#));

    for line in profile.lines().filter(|l| l.contains("(allow network")) {
        assert!(
            line.contains("localhost") || line.contains("unix-socket"),
            "non-loopback network rule: {line}"
        );
    }
    assert!(!profile.contains("(allow network*)"));
}

#[test]
fn test_seatbelt_runner_profile_uses_private_paths() {
    let profile = generate_profile(&SandboxPolicy::for_runner(11434), None);

    assert!(profile.contains(r#"(allow file-read* (subpath "/private/var/tmp/secllama"))"#));
    assert!(profile.contains(r#"(allow file-write* (subpath "/private/var/tmp/secllama"))"#));
    for line in profile.lines().filter(|l| l.contains("(subpath")) {
        assert!(!line.contains(r#""/tmp/"#), "unresolved path: {line}");
        assert!(!line.contains(r#""/var/"#), "unresolved path: {line}");
        assert!(!line.contains(r#""/etc/"#), "unresolved path: {line}");
    }
}

#[test]
fn test_seatbelt_profile_includes_program_directory() {
    let profile = generate_profile(
        &runner_policy(),
        Some(std::path::Path::new("/opt/llama/bin")),
    );
    assert!(profile.contains(r#"(allow file-read* (subpath "/opt/llama/bin"))"#));
}

#[cfg(unix)]
#[test]
fn test_seatbelt_wraps_launch_with_private_profile() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    // Any existing file stands in for sandbox-exec; nothing is spawned here.
    let fake_exec = dir.path().join("sandbox-exec");
    std::fs::write(&fake_exec, "").unwrap();

    let enforcer = SeatbeltEnforcer::new()
        .with_sandbox_exec(&fake_exec)
        .with_profile_dir(dir.path());
    let mut launch = launch();
    enforcer.apply(&mut launch, &runner_policy()).unwrap();

    let line = launch.command_line();
    assert_eq!(line[0], fake_exec.to_str().unwrap());
    assert_eq!(line[1], "-f");
    assert_eq!(&line[3..], ["llama-server", "--port", "11434"]);

    let profile_path = launch.artifacts().next().unwrap().to_path_buf();
    assert_eq!(profile_path.to_str().unwrap(), line[2]);
    let mode = std::fs::metadata(&profile_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(std::fs::read_to_string(&profile_path).unwrap().contains("localhost:11434"));

    drop(launch);
    assert!(!profile_path.exists());
}

// --- Linux network namespace ---

#[test]
fn test_unprivileged_namespace_wraps_with_user_namespace() {
    let runner = ScriptedRunner::succeeding().shared();
    let enforcer = NamespaceEnforcer::new(runner.clone())
        .with_privileged(false)
        .with_landlock(false);

    let mut launch = launch();
    enforcer.apply(&mut launch, &runner_policy()).unwrap();

    assert_eq!(
        launch.command_line(),
        vec![
            "unshare",
            "--user",
            "--map-root-user",
            "--net",
            "--",
            "llama-server",
            "--port",
            "11434"
        ]
    );
    assert!(launch.uses_network_namespace());

    let trial = &runner.calls_to("unshare")[0];
    let mut expected: Vec<&str> = unshare_flags(false).to_vec();
    expected.push("true");
    assert_eq!(trial.args, expected);
}

#[test]
fn test_wrapping_keeps_arguments_and_working_directory() {
    let runner = ScriptedRunner::succeeding().shared();
    let enforcer = NamespaceEnforcer::new(runner)
        .with_privileged(false)
        .with_landlock(false);

    let mut launch = launch().current_dir("/tmp/secllama");
    enforcer.apply(&mut launch, &runner_policy()).unwrap();

    assert_eq!(launch.get_program(), "unshare");
    let flags = unshare_flags(false).len();
    assert_eq!(&launch.get_args()[..flags], unshare_flags(false));
    assert_eq!(&launch.get_args()[flags..], ["llama-server", "--port", "11434"]);
    assert_eq!(
        launch.get_current_dir(),
        Some(std::path::Path::new("/tmp/secllama"))
    );
    assert!(launch.confinement_gaps().is_empty());
}

#[test]
fn test_missing_unshare_is_partial() {
    let runner = ScriptedRunner::succeeding().without_program("unshare").shared();
    let enforcer = NamespaceEnforcer::new(runner)
        .with_privileged(false)
        .with_landlock(false);

    let mut launch = launch();
    let err = enforcer.apply(&mut launch, &runner_policy()).unwrap_err();
    assert!(matches!(err, SandboxError::EnforcementPartial { .. }));
    assert_eq!(launch.command_line()[0], "llama-server");
}

#[test]
fn test_failed_unshare_trial_run_is_partial() {
    let runner = ScriptedRunner::failing(1).shared();
    let enforcer = NamespaceEnforcer::new(runner)
        .with_privileged(false)
        .with_landlock(false);
    let err = enforcer.apply(&mut launch(), &runner_policy()).unwrap_err();
    assert!(matches!(err, SandboxError::EnforcementPartial { .. }));
}

#[cfg(target_os = "linux")]
#[test]
fn test_privileged_namespace_uses_child_hook() {
    let runner = ScriptedRunner::succeeding().shared();
    let enforcer = NamespaceEnforcer::new(runner.clone())
        .with_privileged(true)
        .with_landlock(false);

    let mut launch = launch();
    enforcer.apply(&mut launch, &runner_policy()).unwrap();
    assert_eq!(launch.command_line()[0], "llama-server");
    assert_eq!(launch.child_hook_count(), 1);
    assert!(runner.calls().is_empty());
}

// --- Windows firewall ---

#[test]
fn test_firewall_rules_block_external_and_allow_loopback() {
    let runner = ScriptedRunner::succeeding().shared();
    let enforcer = FirewallEnforcer::new(runner.clone());
    enforcer.apply(&mut launch(), &runner_policy()).unwrap();

    let calls = runner.calls_to("netsh");
    let adds: Vec<_> = calls.iter().filter(|c| c.has_arg("add")).collect();
    let deletes: Vec<_> = calls.iter().filter(|c| c.has_arg("delete")).collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(adds.len(), 2);

    let block = adds[0];
    assert!(block.has_arg("name=SecLlama-BlockExternal"));
    assert!(block.has_arg("dir=out"));
    assert!(block.has_arg("action=block"));
    assert!(block.has_arg(&format!("remoteip={NON_LOOPBACK_RANGES}")));

    let allow = adds[1];
    assert!(allow.has_arg("name=SecLlama-BlockExternal-AllowLocal"));
    assert!(allow.has_arg("action=allow"));
    assert!(allow.has_arg(&format!("remoteip={LOOPBACK_ADDRESSES}")));
    assert!(allow.has_arg("remoteport=11434"));
}

#[test]
fn test_firewall_without_localhost_blocks_everything() {
    let runner = ScriptedRunner::succeeding().shared();
    let policy = SandboxPolicy::builder().allow_port(11434).build();
    FirewallEnforcer::new(runner.clone())
        .apply(&mut launch(), &policy)
        .unwrap();

    let adds: Vec<_> = runner
        .calls_to("netsh")
        .into_iter()
        .filter(|c| c.has_arg("add"))
        .collect();
    assert_eq!(adds.len(), 1);
    assert!(!adds[0].args.iter().any(|a| a.starts_with("remoteip=")));
}

#[test]
fn test_firewall_refusal_is_partial() {
    let runner = ScriptedRunner::new(|_, args, _| {
        let status = if args.contains(&"add") { 1 } else { 0 };
        Ok(CommandOutput::with_status(status, "requires elevation"))
    });
    let err = FirewallEnforcer::new(Arc::new(runner))
        .apply(&mut launch(), &runner_policy())
        .unwrap_err();
    assert!(matches!(err, SandboxError::EnforcementPartial { .. }));
}

// --- Enforcement contract ---

#[test]
fn test_sandbox_applies_at_most_once() {
    let runner = ScriptedRunner::succeeding().shared();
    let enforcer = FirewallEnforcer::new(runner);
    let mut launch = launch();

    let outcome = apply_sandbox(&mut launch, &runner_policy(), &enforcer, true).unwrap();
    assert_eq!(
        outcome,
        EnforcementOutcome::Applied {
            mechanism: "windows-firewall"
        }
    );
    assert_eq!(launch.sandbox_mechanism(), Some("windows-firewall"));

    let again = apply_sandbox(&mut launch, &runner_policy(), &enforcer, false);
    assert_eq!(again, Err(SandboxError::AlreadyApplied));
}

#[test]
fn test_failure_degrades_unless_strict() {
    let mut lenient = launch();
    let outcome = apply_sandbox(&mut lenient, &runner_policy(), &NoopEnforcer, false).unwrap();
    assert!(matches!(outcome, EnforcementOutcome::Degraded { .. }));
    assert!(!outcome.is_applied());
    assert!(!outcome.is_complete());
    assert!(lenient.is_sandbox_attempted());
    assert_eq!(lenient.sandbox_mechanism(), None);

    let mut strict = launch();
    let err = apply_sandbox(&mut strict, &runner_policy(), &NoopEnforcer, true).unwrap_err();
    assert!(matches!(err, SandboxError::UnsupportedOs(_)));
}

#[test]
fn test_disabled_preparer_leaves_launch_untouched() {
    let preparer = SandboxPreparer::new(Arc::new(NoopEnforcer), false, true);
    let mut launch = launch();
    assert_eq!(
        preparer.prepare(&mut launch, &runner_policy()).unwrap(),
        EnforcementOutcome::Disabled
    );
    assert!(!launch.is_sandbox_attempted());
    assert_eq!(launch.command_line(), vec!["llama-server", "--port", "11434"]);
}

#[test]
fn test_policy_deserializes_and_rejects_unknown_fields() {
    let policy: SandboxPolicy = serde_json::from_str(
        r#"{"allow_localhost": true, "allowed_ports": [11434], "allowed_write_paths": ["/tmp/x"]}"#,
    )
    .unwrap();
    assert!(policy.allow_localhost());
    assert_eq!(policy.effective_ports().collect::<Vec<_>>(), vec![11434]);

    assert!(serde_json::from_str::<SandboxPolicy>(r#"{"allow_network": true}"#).is_err());
}
