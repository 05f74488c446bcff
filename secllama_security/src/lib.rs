//! # SecLlama Security Layer
//!
//! Message encryption and runner isolation for a local LLM runtime.
//!
//! ## Key Components
//!
//! - **`crypto`**: AES-256-GCM sealing of byte and string payloads, plus
//!   PBKDF2-HMAC-SHA256 key derivation from passwords.
//! - **`keystore`**: the [`SecretStore`](keystore::SecretStore) capability
//!   over the OS credential facility (Keychain, Secret Service, Credential
//!   Manager) with an in-memory variant.
//! - **`manager`**: [`KeyManager`], owning the working key: one-shot
//!   initialization, encrypt/decrypt, rotation.
//! - **`envelope`**: [`SecureCodec`], encryption-aware JSON marshaling that
//!   degrades to plaintext with a warning unless strict.
//! - **`history`**: [`HistoryFile`], per-line encrypted input history with
//!   transparent migration of plaintext lines.
//! - **`sandbox`**: [`SandboxPolicy`](sandbox::SandboxPolicy) and the
//!   per-platform [`Enforcer`](sandbox::Enforcer)s (Seatbelt, network
//!   namespace with Landlock, Windows Firewall).
//! - **`command`**: the [`CommandRunner`](command::CommandRunner) seam every
//!   platform helper binary is driven through.
//! - **`config`**: [`SecurityConfig`], the `SECLLAMA_*` environment toggles.
//!
//! ## Composition
//!
//! There is no process-wide singleton. The binary (or embedding runtime)
//! builds one `Arc<KeyManager>` over the platform store and hands it to the
//! codec and the history file:
//!
//! ```no_run
//! use std::sync::Arc;
//! use secllama_security::{KeyManager, SecureCodec, keystore::default_secret_store};
//!
//! # fn main() -> Result<(), secllama_security::SecurityError> {
//! let manager = Arc::new(KeyManager::new(default_secret_store()?));
//! manager.initialize()?;
//! let codec = SecureCodec::new(manager.clone());
//! let sealed = codec.marshal(&"hello", true)?;
//! let text: String = codec.unmarshal(&sealed.bytes)?;
//! assert_eq!(text, "hello");
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod history;
pub mod keystore;
pub mod manager;
pub mod sandbox;
pub mod shell;
pub mod test_utils;
pub mod utils;

pub use config::SecurityConfig;
pub use envelope::{Marshaled, Protection, SecureCodec, SecureEnvelope};
pub use error::{SecurityError, SecurityResult};
pub use history::HistoryFile;
pub use manager::KeyManager;
pub use sandbox::{EnforcementOutcome, LaunchCommand, SandboxError, SandboxPolicy};
