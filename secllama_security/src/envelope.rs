//! # Secure Envelope Codec
//!
//! Encryption-aware JSON marshaling for conversational payloads.
//!
//! With encryption enabled, a value is serialized to JSON, sealed by the
//! [`KeyManager`], and wrapped as
//!
//! ```json
//! {"content": "<base64 ciphertext>", "encrypted": true}
//! ```
//!
//! With encryption disabled the value is written as plain JSON. When encryption
//! is requested but the key manager cannot be brought up, the codec writes
//! plain JSON, logs a warning and reports [`Protection::Degraded`]; strict mode
//! turns that into an error instead. Only availability failures degrade; any
//! other initialization error is returned.
//!
//! Decoding accepts both shapes. Only an envelope with `"encrypted": true` is
//! decrypted; every other document is parsed directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    error::{SecurityError, SecurityResult},
    manager::KeyManager,
};

/// Wire form of a protected message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecureEnvelope {
    pub content: String,
    #[serde(default)]
    pub encrypted: bool,
}

impl SecureEnvelope {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encrypted: false,
        }
    }
}

/// How a marshaled payload ended up being protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Sealed inside an encrypted envelope
    Encrypted,
    /// Encryption was not requested
    Plain,
    /// Encryption was requested but the key manager was unavailable
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marshaled {
    pub bytes: Vec<u8>,
    pub protection: Protection,
}

#[derive(Debug, Clone)]
pub struct SecureCodec {
    manager: Option<Arc<KeyManager>>,
    strict: bool,
}

impl SecureCodec {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self {
            manager: Some(manager),
            strict: false,
        }
    }

    /// A codec with no key manager; encryption requests degrade to plain JSON.
    pub fn without_manager() -> Self {
        Self {
            manager: None,
            strict: false,
        }
    }

    /// In strict mode, an unavailable key manager fails `marshal` instead of degrading.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The key manager, initialized on first use.
    fn ready_manager(&self) -> SecurityResult<&KeyManager> {
        let manager = self.manager.as_deref().ok_or(SecurityError::NotInitialized)?;
        manager.initialize()?;
        Ok(manager)
    }

    /// Only availability errors outside strict mode fall back to plain output.
    fn may_degrade(&self, err: &SecurityError) -> bool {
        !self.strict && err.is_availability_error()
    }

    /// Resolve the manager for an encryption request, or `None` to degrade.
    fn manager_for_encryption(&self) -> SecurityResult<Option<&KeyManager>> {
        match self.ready_manager() {
            Ok(manager) => Ok(Some(manager)),
            Err(e) if self.may_degrade(&e) => {
                warn!("Encryption enabled but key manager not available: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn marshal<T: Serialize + ?Sized>(
        &self,
        value: &T,
        encryption_enabled: bool,
    ) -> SecurityResult<Marshaled> {
        let json = serde_json::to_string(value)?;

        if !encryption_enabled {
            return Ok(Marshaled {
                bytes: json.into_bytes(),
                protection: Protection::Plain,
            });
        }

        let Some(manager) = self.manager_for_encryption()? else {
            return Ok(Marshaled {
                bytes: json.into_bytes(),
                protection: Protection::Degraded,
            });
        };

        let envelope = SecureEnvelope {
            content: manager.encrypt(&json)?,
            encrypted: true,
        };
        Ok(Marshaled {
            bytes: serde_json::to_vec(&envelope)?,
            protection: Protection::Encrypted,
        })
    }

    pub fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> SecurityResult<T> {
        match serde_json::from_slice::<SecureEnvelope>(bytes) {
            Ok(envelope) if envelope.encrypted => {
                let json = self.ready_manager()?.decrypt(&envelope.content)?;
                Ok(serde_json::from_str(&json)?)
            }
            _ => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Protect a single message string.
    pub fn encrypt_content(
        &self,
        content: &str,
        encryption_enabled: bool,
    ) -> SecurityResult<SecureEnvelope> {
        if !encryption_enabled {
            return Ok(SecureEnvelope::plain(content));
        }
        match self.manager_for_encryption()? {
            Some(manager) => Ok(SecureEnvelope {
                content: manager.encrypt(content)?,
                encrypted: true,
            }),
            None => Ok(SecureEnvelope::plain(content)),
        }
    }

    /// Recover the message string; unencrypted content is returned verbatim.
    pub fn decrypt_content(&self, envelope: &SecureEnvelope) -> SecurityResult<String> {
        if !envelope.encrypted {
            return Ok(envelope.content.clone());
        }
        self.ready_manager()?.decrypt(&envelope.content)
    }

    /// Parse an envelope document and recover its message string.
    pub fn open_envelope(&self, bytes: &[u8]) -> SecurityResult<String> {
        let envelope: SecureEnvelope = serde_json::from_slice(bytes)?;
        self.decrypt_content(&envelope)
    }
}
