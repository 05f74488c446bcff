//! Helper binary execution.
//!
//! Every platform helper (`security`, `secret-tool`, `cmdkey`, `powershell`,
//! `netsh`, `unshare`) is invoked through [`CommandRunner`]. Contracts rely on
//! the exit status only, plus the few "not found" exit codes the backends
//! document. Tests substitute the fakes in [`crate::test_utils`].

use std::{
    ffi::OsStr,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use tokio::{io::AsyncWriteExt, time::timeout};
use tracing::debug;

/// Default bound on a single helper invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a finished helper process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Build an output with the given exit code and stdout.
    pub fn with_status(status: i32, stdout: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// The most useful diagnostic text: stderr if present, otherwise stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("'{program}' was not found on PATH")]
    NotFound { program: String },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to run '{program}': {reason}")]
    Io { program: String, reason: String },
}

/// Runs helper binaries to completion.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    /// Run `program` with `args`, optionally feeding `stdin`, and wait for it.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, RunError>;

    /// Whether `program` can be resolved for execution.
    fn is_available(&self, program: &str) -> bool;
}

/// Shared handle to a runner, as held by stores and enforcers.
pub type SharedRunner = Arc<dyn CommandRunner>;

/// Runs helpers as real child processes with a bounded timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn shared() -> SharedRunner {
        Arc::new(Self::new())
    }

    async fn run_async(
        program: String,
        args: Vec<String>,
        stdin: Option<String>,
        limit: Duration,
    ) -> Result<CommandOutput, RunError> {
        let io_error = |e: std::io::Error| RunError::Io {
            program: program.clone(),
            reason: e.to_string(),
        };

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunError::NotFound {
                    program: program.clone(),
                }
            } else {
                io_error(e)
            }
        })?;

        let completion = async {
            if let (Some(input), Some(mut pipe)) = (stdin.as_deref(), child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = timeout(limit, completion)
            .await
            .map_err(|_| RunError::TimedOut {
                program: program.clone(),
                timeout: limit,
            })?
            .map_err(io_error)?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, RunError> {
        // Arguments may carry secrets; only the shape is logged.
        debug!("Running helper '{}' with {} argument(s)", program, args.len());

        let future = Self::run_async(
            program.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
            stdin.map(str::to_string),
            self.timeout,
        );
        block_on(program, future)?
    }

    fn is_available(&self, program: &str) -> bool {
        find_in_path(program).is_some()
    }
}

/// Drive `future` on a private current-thread runtime.
///
/// Inside an existing tokio runtime the private runtime lives on a scoped
/// thread, since a runtime cannot be started from within another.
fn block_on<F, T>(program: &str, future: F) -> Result<T, RunError>
where
    F: Future<Output = T> + Send,
    T: Send,
{
    let drive = move || -> Result<T, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RunError::Io {
                program: program.to_string(),
                reason: format!("failed to start runtime: {e}"),
            })?;
        Ok(runtime.block_on(future))
    };

    if tokio::runtime::Handle::try_current().is_ok() {
        std::thread::scope(|scope| {
            scope.spawn(drive).join().map_err(|_| RunError::Io {
                program: program.to_string(),
                reason: "helper thread panicked".to_string(),
            })?
        })
    } else {
        drive()
    }
}

/// Resolve `program` against `PATH` the way the OS would.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        executable_names(program)
            .map(|name| dir.join(name))
            .find(|full| is_executable_file(full))
    })
}

fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    let extensions: &[&str] = if cfg!(windows) && Path::new(program).extension().is_none() {
        &["", ".exe", ".cmd", ".bat"]
    } else {
        &[""]
    };
    extensions.iter().map(move |ext| format!("{program}{ext}"))
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Directory holding `program`, resolving bare names through `PATH`.
pub fn program_directory(program: impl AsRef<OsStr>) -> Option<PathBuf> {
    let program = program.as_ref().to_str()?;
    let resolved = find_in_path(program).unwrap_or_else(|| PathBuf::from(program));
    resolved.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let mut output = CommandOutput::with_status(1, "out\n");
        assert_eq!(output.diagnostic(), "out");
        output.stderr = "  boom \n".to_string();
        assert_eq!(output.diagnostic(), "boom");
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run("secllama-definitely-missing-helper", &[], None)
            .unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
        assert!(!runner.is_available("secllama-definitely-missing-helper"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output_and_status() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run("sh", &["-c", "echo hello; echo oops >&2; exit 3"], None)
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_feeds_stdin() {
        let runner = SystemCommandRunner::new();
        let output = runner.run("cat", &[], Some("secret")).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "secret");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let runner = SystemCommandRunner::with_timeout(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"], None).unwrap_err();
        assert!(matches!(err, RunError::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_inside_runtime() {
        let runner = SystemCommandRunner::new();
        let output = runner.run("sh", &["-c", "exit 0"], None).unwrap();
        assert!(output.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_path_resolves_shell() {
        let sh = find_in_path("sh").expect("sh should be on PATH");
        assert!(sh.is_absolute());
        assert!(program_directory("sh").is_some());
    }
}
