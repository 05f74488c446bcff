//! A runner launch under construction.
//!
//! Enforcers rewrite a [`LaunchCommand`] in place (wrapping the program,
//! registering child-side setup, attaching profile files) before it is turned
//! into a real process. Profile files are owned by the launch and then by the
//! [`SandboxedChild`], so they outlive the process that reads them.

use std::{
    ffi::OsString,
    io,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    process::{Child, Command},
};

use tempfile::TempPath;

/// Setup run in the forked child before `exec`.
pub type ChildHook = Box<dyn FnMut() -> io::Result<()> + Send + Sync + 'static>;

pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    child_hooks: Vec<ChildHook>,
    new_network_namespace: bool,
    sandbox_mechanism: Option<&'static str>,
    sandbox_attempted: bool,
    confinement_gaps: Vec<String>,
    artifacts: Vec<TempPath>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            child_hooks: Vec::new(),
            new_network_namespace: false,
            sandbox_mechanism: None,
            sandbox_attempted: false,
            confinement_gaps: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn get_program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Program followed by its arguments, as it will be executed.
    pub fn command_line(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Whether an enforcer has been run against this launch, successfully or not.
    pub fn is_sandbox_attempted(&self) -> bool {
        self.sandbox_attempted
    }

    /// The mechanism that successfully sandboxed this launch.
    pub fn sandbox_mechanism(&self) -> Option<&'static str> {
        self.sandbox_mechanism
    }

    /// Parts of the policy the applied mechanism left unenforced.
    pub fn confinement_gaps(&self) -> &[String] {
        &self.confinement_gaps
    }

    pub fn uses_network_namespace(&self) -> bool {
        self.new_network_namespace
    }

    pub fn child_hook_count(&self) -> usize {
        self.child_hooks.len()
    }

    /// Temporary files that must live as long as the child.
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(|p| &**p)
    }

    /// Make `wrapper wrapper_args… program args…` the new command line.
    pub(crate) fn wrap<I, S>(&mut self, wrapper: impl Into<String>, wrapper_args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let original = std::mem::replace(&mut self.program, wrapper.into());
        let mut args: Vec<String> = wrapper_args.into_iter().map(Into::into).collect();
        args.push(original);
        args.append(&mut self.args);
        self.args = args;
    }

    pub(crate) fn push_child_hook(&mut self, hook: ChildHook) {
        self.child_hooks.push(hook);
    }

    pub(crate) fn set_network_namespace(&mut self) {
        self.new_network_namespace = true;
    }

    pub(crate) fn keep_artifact(&mut self, path: TempPath) {
        self.artifacts.push(path);
    }

    pub(crate) fn mark_attempted(&mut self) {
        self.sandbox_attempted = true;
    }

    pub(crate) fn record_gap(&mut self, gap: impl Into<String>) {
        self.confinement_gaps.push(gap.into());
    }

    pub(crate) fn mark_sandboxed(&mut self, mechanism: &'static str) {
        self.sandbox_mechanism = Some(mechanism);
    }

    /// Build the process command, handing back the artifacts it depends on.
    pub fn into_parts(self) -> (Command, Vec<TempPath>) {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command.envs(self.envs);

        #[cfg(unix)]
        for hook in self.child_hooks {
            use std::os::unix::process::CommandExt;
            // SAFETY: hooks only issue raw syscalls (unshare, landlock restrict)
            // on state prepared in the parent.
            unsafe {
                command.pre_exec(hook);
            }
        }

        #[cfg(not(unix))]
        if !self.child_hooks.is_empty() {
            tracing::warn!(
                "Ignoring {} child setup hook(s) on this platform",
                self.child_hooks.len()
            );
        }

        (command, self.artifacts)
    }

    pub fn spawn(self) -> io::Result<SandboxedChild> {
        let (mut command, artifacts) = self.into_parts();
        let child = command.spawn()?;
        Ok(SandboxedChild {
            child,
            _artifacts: artifacts,
        })
    }
}

impl std::fmt::Debug for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("current_dir", &self.current_dir)
            .field("child_hooks", &self.child_hooks.len())
            .field("new_network_namespace", &self.new_network_namespace)
            .field("sandbox_mechanism", &self.sandbox_mechanism)
            .field("confinement_gaps", &self.confinement_gaps)
            .field("artifacts", &self.artifacts.len())
            .finish()
    }
}

/// A running child together with the files its sandbox reads.
#[derive(Debug)]
pub struct SandboxedChild {
    child: Child,
    _artifacts: Vec<TempPath>,
}

impl Deref for SandboxedChild {
    type Target = Child;

    fn deref(&self) -> &Self::Target {
        &self.child
    }
}

impl DerefMut for SandboxedChild {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.child
    }
}
