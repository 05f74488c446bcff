//! # SecLlama Security CLI
//!
//! This module contains the command-line interface definition and main entry point.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use clap::{Args, Parser, Subcommand};

use crate::{
    command::{SystemCommandRunner, program_directory},
    config::SecurityConfig,
    crypto::{SALT_SIZE, derive_key, generate_salt},
    envelope::{SecureCodec, SecureEnvelope},
    history::{DEFAULT_HISTORY_LIMIT, HistoryFile},
    keystore::{MemorySecretStore, SharedSecretStore, default_secret_store},
    manager::KeyManager,
    sandbox::{
        EnforcementOutcome, LaunchCommand, SandboxPolicy, SandboxPreparer,
        check_sandbox_prerequisites, generate_profile, platform_enforcer,
    },
    utils::logging::init_logging,
};

/// Port the runner serves on when no `--port` is given.
pub const DEFAULT_RUNNER_PORT: u16 = 11434;

/// SecLlama security layer: message encryption and runner sandboxing.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "secllama-security operates the SecLlama security layer.

Keys live in the OS secret store (Keychain, Secret Service or Credential
Manager) under service 'secllama'. Runners are sandboxed with Seatbelt on
macOS, a network namespace on Linux and Windows Firewall rules on Windows.

Examples:
  secllama-security status
  secllama-security encrypt 'hello'
  secllama-security profile --port 11434
  secllama-security run --port 11434 -- llama-server --port 11434"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    /// Keep the key in process memory instead of the OS secret store
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show toggles, secret store and sandbox availability
    Status,

    /// Encrypt a message into a secure envelope
    Encrypt { text: String },

    /// Decrypt an envelope document or a bare base64 ciphertext
    Decrypt { ciphertext: String },

    /// Replace the stored key; existing ciphertext becomes unreadable
    RotateKey,

    /// Derive a key from a password with PBKDF2-HMAC-SHA256
    DeriveKey {
        #[arg(long)]
        password: String,

        /// Base64 salt; a fresh one is generated when omitted
        #[arg(long)]
        salt: Option<String>,
    },

    /// Print the Seatbelt profile for a policy
    Profile {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Runner binary whose directory should be readable
        #[arg(long)]
        program: Option<PathBuf>,
    },

    /// Print the decrypted input history
    History {
        /// History file (default: ~/.secllama/history)
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Launch a program under the runner sandbox
    Run {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Fail instead of running unconfined when the sandbox cannot be applied
        #[arg(long)]
        strict: bool,

        /// Program and arguments (after --)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Sandbox policy knobs shared by `profile` and `run`.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Loopback port the runner may use (repeatable)
    #[arg(long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Deny loopback too
    #[arg(long)]
    pub no_localhost: bool,

    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    #[arg(long = "allow-read", value_name = "PATH")]
    pub read_paths: Vec<PathBuf>,

    #[arg(long = "allow-write", value_name = "PATH")]
    pub write_paths: Vec<PathBuf>,

    /// Load the policy from a JSON file instead of the flags above
    #[arg(
        long,
        conflicts_with_all = ["ports", "no_localhost", "working_dir", "read_paths", "write_paths"]
    )]
    pub policy_file: Option<PathBuf>,
}

impl PolicyArgs {
    /// Without any flag this is the default runner policy.
    pub fn to_policy(&self) -> Result<SandboxPolicy> {
        if let Some(path) = &self.policy_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read policy file {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("Invalid sandbox policy in {}", path.display()));
        }

        let customized = !self.ports.is_empty()
            || self.no_localhost
            || self.working_dir.is_some()
            || !self.read_paths.is_empty()
            || !self.write_paths.is_empty();
        if !customized {
            return Ok(SandboxPolicy::for_runner(DEFAULT_RUNNER_PORT));
        }

        let mut builder = SandboxPolicy::builder()
            .allow_localhost(!self.no_localhost)
            .allow_ports(self.ports.iter().copied());
        if let Some(dir) = &self.working_dir {
            builder = builder.working_directory(dir);
        }
        for path in &self.read_paths {
            builder = builder.allow_read(path);
        }
        for path in &self.write_paths {
            builder = builder.allow_write(path);
        }
        Ok(builder.build())
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr)?;

    let config = SecurityConfig::from_env();
    tracing::debug!("Security configuration: {:?}", config);

    match &cli.command {
        Command::Status => status(&cli, &config),
        Command::Encrypt { text } => {
            let codec = SecureCodec::new(key_manager(&cli)?).strict(config.strict_network_isolation);
            let envelope = codec.encrypt_content(text, config.enable_encryption)?;
            println!("{}", serde_json::to_string(&envelope)?);
            Ok(())
        }
        Command::Decrypt { ciphertext } => {
            let manager = key_manager(&cli)?;
            let plaintext = match serde_json::from_str::<SecureEnvelope>(ciphertext) {
                Ok(envelope) => SecureCodec::new(manager).decrypt_content(&envelope)?,
                Err(_) => manager.decrypt(ciphertext.trim())?,
            };
            println!("{plaintext}");
            Ok(())
        }
        Command::RotateKey => {
            let manager = key_manager(&cli)?;
            let generation = manager.rotate().context("Key rotation failed")?;
            println!(
                "Key rotated in {} (generation {generation}); earlier ciphertext is no longer readable",
                manager.store_name()
            );
            Ok(())
        }
        Command::DeriveKey { password, salt } => derive(password, salt.as_deref()),
        Command::Profile { policy, program } => {
            let policy = policy.to_policy()?;
            let program_dir = program.as_ref().and_then(program_directory);
            print!("{}", generate_profile(&policy, program_dir.as_deref()));
            Ok(())
        }
        Command::History { file, limit } => {
            let path = match file {
                Some(path) => path.clone(),
                None => HistoryFile::default_path()?,
            };
            let manager = key_manager(&cli).ok();
            let history = HistoryFile::new(path, manager).with_limit(*limit);
            for (i, entry) in history.load()?.iter().enumerate() {
                println!("{:>4}  {}", i + 1, entry);
            }
            Ok(())
        }
        Command::Run {
            policy,
            strict,
            command,
        } => launch(&config, policy, *strict, command).await,
    }
}

fn key_manager(cli: &Cli) -> Result<Arc<KeyManager>> {
    let store: SharedSecretStore = if cli.ephemeral {
        Arc::new(MemorySecretStore::new())
    } else {
        default_secret_store().context("No OS secret store available (try --ephemeral)")?
    };
    let manager = Arc::new(KeyManager::new(store));
    manager
        .initialize()
        .context("Failed to initialize the message encryption key")?;
    Ok(manager)
}

fn status(cli: &Cli, config: &SecurityConfig) -> Result<()> {
    println!("encryption enabled:        {}", config.enable_encryption);
    println!("sandbox enabled:           {}", config.enable_sandbox);
    println!("strict network isolation:  {}", config.strict_network_isolation);

    let store = if cli.ephemeral {
        Ok(Arc::new(MemorySecretStore::new()) as SharedSecretStore)
    } else {
        default_secret_store()
    };
    match store {
        Ok(store) => {
            let present = store.exists(crate::keystore::ENCRYPTION_KEY_ACCOUNT);
            println!("secret store:              {} (key stored: {})", store.name(), present);
        }
        Err(e) => println!("secret store:              unavailable ({e})"),
    }

    let runner = SystemCommandRunner::shared();
    match check_sandbox_prerequisites(runner.as_ref()) {
        Ok(mechanism) => println!("sandbox mechanism:         {mechanism}"),
        Err(e) => println!("sandbox mechanism:         unavailable ({e})"),
    }

    #[cfg(target_os = "linux")]
    println!(
        "landlock:                  {}",
        if crate::sandbox::check_landlock_available(runner.as_ref()).is_ok() {
            "available"
        } else {
            "unavailable"
        }
    );
    Ok(())
}

fn derive(password: &str, salt: Option<&str>) -> Result<()> {
    let salt = match salt {
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .context("Salt is not valid base64")?,
        None => generate_salt()?.to_vec(),
    };
    if salt.len() != SALT_SIZE {
        bail!("Salt must be {} bytes, got {}", SALT_SIZE, salt.len());
    }

    let key = derive_key(password, &salt);
    println!("salt: {}", STANDARD.encode(&salt));
    println!("key:  {}", key.to_base64().as_str());
    Ok(())
}

async fn launch(
    config: &SecurityConfig,
    policy: &PolicyArgs,
    strict: bool,
    command: &[String],
) -> Result<()> {
    let policy = policy.to_policy()?;
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No program given to run"))?;

    let runner = SystemCommandRunner::shared();
    let preparer = if strict {
        SandboxPreparer::new(platform_enforcer(runner), config.enable_sandbox, true)
    } else {
        SandboxPreparer::from_config(config, runner)
    };

    let mut launch = LaunchCommand::new(program.as_str()).args(args.iter().cloned());
    if let Some(dir) = policy.working_directory() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create working directory {}", dir.display()))?;
        launch = launch.current_dir(dir);
    }

    tracing::debug!(
        "Preparing {} {:?} in {:?}",
        launch.get_program(),
        launch.get_args(),
        launch.get_current_dir()
    );
    match preparer
        .prepare(&mut launch, &policy)
        .context("Sandbox could not be applied")?
    {
        EnforcementOutcome::Applied { mechanism } => {
            eprintln!("secllama-security: sandboxed with {mechanism}");
        }
        EnforcementOutcome::Partial { mechanism, gaps } => {
            eprintln!(
                "secllama-security: WARNING sandboxed with {mechanism}, but {}",
                gaps.join("; ")
            );
        }
        EnforcementOutcome::Degraded { reason } => {
            eprintln!("secllama-security: WARNING running without full isolation: {reason}");
        }
        EnforcementOutcome::Disabled => {
            eprintln!("secllama-security: WARNING sandbox disabled");
        }
    }

    let mut child = launch
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;
    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .context("Runner wait task failed")?
        .context("Failed to wait for runner")?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => std::process::exit(code),
        None => bail!("Runner terminated by a signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_trailing_args() {
        let cli = Cli::try_parse_from([
            "secllama-security",
            "run",
            "--port",
            "8080",
            "--",
            "llama-server",
            "--host",
            "127.0.0.1",
        ])
        .unwrap();
        let Command::Run { policy, command, strict } = cli.command else {
            panic!("expected run");
        };
        assert!(!strict);
        assert_eq!(command, vec!["llama-server", "--host", "127.0.0.1"]);
        let policy = policy.to_policy().unwrap();
        assert!(policy.allow_localhost());
        assert_eq!(policy.allowed_ports().iter().copied().collect::<Vec<_>>(), vec![8080]);
    }

    #[test]
    fn test_default_policy_is_runner_policy() {
        let policy = PolicyArgs::default().to_policy().unwrap();
        assert_eq!(policy, SandboxPolicy::for_runner(DEFAULT_RUNNER_PORT));
    }

    #[test]
    fn test_policy_file_conflicts_with_flags() {
        let result = Cli::try_parse_from([
            "secllama-security",
            "profile",
            "--policy-file",
            "p.json",
            "--port",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"allow_localhost": true, "allowed_ports": [9000]}"#).unwrap();
        let args = PolicyArgs {
            policy_file: Some(path),
            ..PolicyArgs::default()
        };
        let policy = args.to_policy().unwrap();
        assert!(policy.allowed_ports().contains(&9000));
    }
}
