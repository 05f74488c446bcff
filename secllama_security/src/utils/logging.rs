//! # Logging Initialization
//!
//! Installs the process-wide `tracing` subscriber for the SecLlama security
//! layer. [`init_logging`] runs its setup once, no matter how often it is
//! called.
//!
//! ## Logging Configuration
//!
//! 1.  **Environment Filter (`EnvFilter`)**: verbosity comes from `RUST_LOG`.
//!     When unset, the given level applies to every crate and `debug` to
//!     `secllama_security`.
//!
//! 2.  **File Logging (Default)**: a daily rolling `secllama.log` in the user
//!     cache directory (from the `directories` crate), written through a
//!     non-blocking `tracing_appender` writer without ANSI colors.
//!
//! 3.  **Stderr Logging**: with `log_to_file = false`, or when the cache
//!     directory cannot be determined or written, logs go to `stderr` with
//!     ANSI colors.
//!
//! Key material is never passed to any `tracing` macro in this crate.

use std::{io::stderr, path::Path, sync::Once};

use anyhow::Result;
use directories::ProjectDirs;
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// `trace`-level logging to stderr, for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Initializes the logging system.
///
/// # Errors
///
/// Currently infallible; the `Result` leaves room for subscriber setup errors.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},secllama_security=debug")));

        if log_to_file && let Some(proj_dirs) = ProjectDirs::from("com", "SecLlama", "secllama") {
            let log_dir = proj_dirs.cache_dir();

            // rolling::daily panics on an unwritable directory.
            let file_appender = if can_write(log_dir) {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tracing_appender::rolling::daily(log_dir, "secllama.log")
                }))
                .ok()
            } else {
                None
            };

            if let Some(file_appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .try_init();
                // Leaked so buffered lines are flushed at exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .try_init();
    });

    Ok(())
}

/// Create `dir` if needed and check that a file can be written there.
fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".secllama_log_test");
    match std::fs::write(&marker, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(can_write(&nested));
        assert!(nested.is_dir());
        assert!(!nested.join(".secllama_log_test").exists());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("info", false).unwrap();
        init_logging("debug", false).unwrap();
    }
}
