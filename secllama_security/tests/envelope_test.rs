//! Secure envelope codec behavior.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use secllama_security::{
    KeyManager, Protection, SecureCodec, SecureEnvelope, SecurityError,
    keystore::MemorySecretStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    metadata: BTreeMap<String, String>,
}

fn message() -> ChatMessage {
    ChatMessage {
        role: "user".to_string(),
        content: "what is in my notes?".to_string(),
        metadata: BTreeMap::from([("session".to_string(), "42".to_string())]),
    }
}

fn codec() -> SecureCodec {
    SecureCodec::new(Arc::new(KeyManager::new(Arc::new(MemorySecretStore::new()))))
}

#[test]
fn test_marshal_round_trip_with_and_without_encryption() {
    let codec = codec();
    for enabled in [true, false] {
        let marshaled = codec.marshal(&message(), enabled).unwrap();
        let decoded: ChatMessage = codec.unmarshal(&marshaled.bytes).unwrap();
        assert_eq!(decoded, message());
    }
}

#[test]
fn test_encrypted_output_is_an_envelope() {
    let marshaled = codec().marshal(&message(), true).unwrap();
    assert_eq!(marshaled.protection, Protection::Encrypted);

    let envelope: SecureEnvelope = serde_json::from_slice(&marshaled.bytes).unwrap();
    assert!(envelope.encrypted);
    assert!(!envelope.content.contains("notes"));
}

#[test]
fn test_plain_output_is_the_value_itself() {
    let marshaled = codec().marshal(&message(), false).unwrap();
    assert_eq!(marshaled.protection, Protection::Plain);
    assert_eq!(marshaled.bytes, serde_json::to_vec(&message()).unwrap());
}

#[test]
fn test_unavailable_manager_degrades_unless_strict() {
    let store = Arc::new(MemorySecretStore::new());
    store.set_fail_writes(true);
    let manager = Arc::new(KeyManager::new(store));

    let lenient = SecureCodec::new(manager.clone());
    let marshaled = lenient.marshal(&message(), true).unwrap();
    assert_eq!(marshaled.protection, Protection::Degraded);
    let decoded: ChatMessage = lenient.unmarshal(&marshaled.bytes).unwrap();
    assert_eq!(decoded, message());

    let strict = SecureCodec::new(manager).strict(true);
    assert!(matches!(
        strict.marshal(&message(), true),
        Err(SecurityError::PersistenceFailure { .. })
    ));
}

#[test]
fn test_envelope_from_another_key_fails_authentication() {
    let sealed = codec().marshal(&message(), true).unwrap();
    let err = codec().unmarshal::<ChatMessage>(&sealed.bytes).unwrap_err();
    assert_eq!(err, SecurityError::AuthenticationFailure);
}

#[test]
fn test_plain_envelope_content_is_returned_verbatim() {
    let codec = SecureCodec::without_manager();
    let bytes = br#"{"content": "hi there", "encrypted": false}"#;
    assert_eq!(codec.open_envelope(bytes).unwrap(), "hi there");

    let envelope = codec.encrypt_content("hi there", true).unwrap();
    assert_eq!(envelope, SecureEnvelope::plain("hi there"));
}

#[test]
fn test_content_helpers_round_trip() {
    let codec = codec();
    let envelope = codec.encrypt_content("secret prompt", true).unwrap();
    assert!(envelope.encrypted);
    assert_eq!(codec.decrypt_content(&envelope).unwrap(), "secret prompt");
}
