//! Test helper utilities for SecLlama.
//!
//! Fakes for the two seams the security layer drives external state through:
//! [`CommandRunner`] for helper binaries and [`SecretStore`] for key
//! persistence. These APIs are intended for test-only code paths.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    command::{CommandOutput, CommandRunner, RunError},
    crypto::EncryptionKey,
    error::SecurityResult,
    keystore::{MemorySecretStore, SecretStore},
};

/// One helper invocation as seen by a fake runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl RecordedCall {
    fn new(program: &str, args: &[&str], stdin: Option<&str>) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            stdin: stdin.map(str::to_string),
        }
    }

    /// `program arg1 arg2 …`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

type Handler = dyn Fn(&str, &[&str], Option<&str>) -> Result<CommandOutput, RunError> + Send + Sync;

/// A [`CommandRunner`] answering every call from a closure and recording it.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    unavailable: HashSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[&str], Option<&str>) -> Result<CommandOutput, RunError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            unavailable: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call exits 0 with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_, _, _| Ok(CommandOutput::with_status(0, "")))
    }

    /// Every call exits with `status`.
    pub fn failing(status: i32) -> Self {
        Self::new(move |_, _, _| {
            Ok(CommandOutput {
                status: Some(status),
                stdout: String::new(),
                stderr: "scripted failure".to_string(),
            })
        })
    }

    /// Every call times out.
    pub fn timing_out() -> Self {
        Self::new(|program, _, _| {
            Err(RunError::TimedOut {
                program: program.to_string(),
                timeout: Duration::from_secs(10),
            })
        })
    }

    /// Report `program` as missing from `is_available`.
    pub fn without_program(mut self, program: &str) -> Self {
        self.unavailable.insert(program.to_string());
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("unavailable", &self.unavailable)
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, RunError> {
        self.calls.lock().push(RecordedCall::new(program, args, stdin));
        if self.unavailable.contains(program) {
            return Err(RunError::NotFound {
                program: program.to_string(),
            });
        }
        (self.handler)(program, args, stdin)
    }

    fn is_available(&self, program: &str) -> bool {
        !self.unavailable.contains(program)
    }
}

/// Emulates the keyring helpers (`security`, `secret-tool`, `cmdkey`,
/// `powershell`) over one in-memory map, with their exit code conventions.
#[derive(Debug, Default)]
pub struct FakeKeyringRunner {
    secrets: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeKeyringRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Raw stored secret for `service/account`.
    pub fn secret(&self, target: &str) -> Option<String> {
        self.secrets.lock().get(target).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn security(&self, args: &[&str]) -> CommandOutput {
        let target = format!(
            "{}/{}",
            value_after(args, "-s").unwrap_or_default(),
            value_after(args, "-a").unwrap_or_default()
        );
        let mut secrets = self.secrets.lock();
        match args.first().copied() {
            Some("add-generic-password") => {
                let secret = value_after(args, "-w").unwrap_or_default();
                secrets.insert(target, secret.to_string());
                CommandOutput::with_status(0, "")
            }
            Some("find-generic-password") => match secrets.get(&target) {
                Some(secret) if args.last() == Some(&"-w") => {
                    CommandOutput::with_status(0, format!("{secret}\n"))
                }
                Some(_) => CommandOutput::with_status(0, "keychain: item\n"),
                None => CommandOutput::with_status(44, ""),
            },
            Some("delete-generic-password") => match secrets.remove(&target) {
                Some(_) => CommandOutput::with_status(0, ""),
                None => CommandOutput::with_status(44, ""),
            },
            _ => CommandOutput::with_status(2, ""),
        }
    }

    fn secret_tool(&self, args: &[&str], stdin: Option<&str>) -> CommandOutput {
        let target = format!(
            "{}/{}",
            value_after(args, "service").unwrap_or_default(),
            value_after(args, "account").unwrap_or_default()
        );
        let mut secrets = self.secrets.lock();
        match args.first().copied() {
            Some("store") => {
                secrets.insert(target, stdin.unwrap_or_default().to_string());
                CommandOutput::with_status(0, "")
            }
            Some("lookup") => match secrets.get(&target) {
                Some(secret) => CommandOutput::with_status(0, secret.clone()),
                None => CommandOutput::with_status(1, ""),
            },
            Some("clear") => {
                secrets.remove(&target);
                CommandOutput::with_status(0, "")
            }
            _ => CommandOutput::with_status(2, ""),
        }
    }

    fn cmdkey(&self, args: &[&str]) -> CommandOutput {
        let mut secrets = self.secrets.lock();
        let prefixed = |prefix: &str| args.iter().find_map(|a| a.strip_prefix(prefix));
        if let Some(target) = prefixed("/delete:") {
            return match secrets.remove(target) {
                Some(_) => CommandOutput::with_status(0, ""),
                None => CommandOutput::with_status(1, ""),
            };
        }
        match (prefixed("/generic:"), prefixed("/pass:")) {
            (Some(target), Some(pass)) => {
                secrets.insert(target.to_string(), pass.to_string());
                CommandOutput::with_status(0, "")
            }
            _ => CommandOutput::with_status(2, ""),
        }
    }

    fn powershell(&self, args: &[&str]) -> CommandOutput {
        let script = value_after(args, "-Command").unwrap_or_default();
        let Some(target) = script
            .split_once("-Target '")
            .and_then(|(_, rest)| rest.split_once("' -ErrorAction"))
            .map(|(quoted, _)| quoted.replace("''", "'"))
        else {
            return CommandOutput::with_status(2, "");
        };
        match self.secrets.lock().get(&target) {
            Some(secret) if script.contains("Password") => {
                CommandOutput::with_status(0, format!("{secret}\r\n"))
            }
            Some(_) => CommandOutput::with_status(0, ""),
            None => CommandOutput::with_status(1, ""),
        }
    }
}

impl CommandRunner for FakeKeyringRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, RunError> {
        self.calls.lock().push(RecordedCall::new(program, args, stdin));
        match program {
            "security" => Ok(self.security(args)),
            "secret-tool" => Ok(self.secret_tool(args, stdin)),
            "cmdkey" => Ok(self.cmdkey(args)),
            "powershell" => Ok(self.powershell(args)),
            _ => Err(RunError::NotFound {
                program: program.to_string(),
            }),
        }
    }

    fn is_available(&self, program: &str) -> bool {
        matches!(program, "security" | "secret-tool" | "cmdkey" | "powershell")
    }
}

fn value_after<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1))
        .copied()
}

/// A [`MemorySecretStore`] that counts reads and writes.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemorySecretStore,
    retrieves: AtomicUsize,
    stores: AtomicUsize,
    retrieve_delay: Option<Duration>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside every `retrieve`, widening races between first callers.
    pub fn with_retrieve_delay(mut self, delay: Duration) -> Self {
        self.retrieve_delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &MemorySecretStore {
        &self.inner
    }

    pub fn retrieve_count(&self) -> usize {
        self.retrieves.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl SecretStore for CountingStore {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn store(&self, account: &str, key: &EncryptionKey) -> SecurityResult<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(account, key)
    }

    fn retrieve(&self, account: &str) -> SecurityResult<EncryptionKey> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.retrieve_delay {
            std::thread::sleep(delay);
        }
        self.inner.retrieve(account)
    }

    fn delete(&self, account: &str) -> SecurityResult<()> {
        self.inner.delete(account)
    }

    fn exists(&self, account: &str) -> bool {
        self.inner.exists(account)
    }
}
