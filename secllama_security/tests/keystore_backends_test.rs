//! Secret store contract, exercised on every backend through fake helpers.

use std::sync::Arc;

use secllama_security::{
    SecurityError,
    command::SharedRunner,
    crypto::EncryptionKey,
    keystore::{
        CredentialManagerStore, KEYSTORE_SERVICE, KeychainStore, MemorySecretStore, SecretServiceStore,
        SecretStore,
    },
    test_utils::{FakeKeyringRunner, ScriptedRunner},
};

const ACCOUNT: &str = "message-encryption-key";

fn backends(runner: SharedRunner) -> Vec<Box<dyn SecretStore>> {
    vec![
        Box::new(KeychainStore::new(runner.clone())),
        Box::new(SecretServiceStore::new(runner.clone()).unwrap()),
        Box::new(CredentialManagerStore::new(runner)),
        Box::new(MemorySecretStore::new()),
    ]
}

#[test]
fn test_store_retrieve_delete_contract() {
    for store in backends(FakeKeyringRunner::shared()) {
        let name = store.name();
        let key = EncryptionKey::generate().unwrap();

        assert!(!store.exists(ACCOUNT), "{name}");
        assert!(
            matches!(store.retrieve(ACCOUNT), Err(SecurityError::NotFound { .. })),
            "{name}"
        );

        store.store(ACCOUNT, &key).unwrap();
        assert!(store.exists(ACCOUNT), "{name}");
        assert_eq!(store.retrieve(ACCOUNT).unwrap().as_bytes(), key.as_bytes(), "{name}");

        let replacement = EncryptionKey::generate().unwrap();
        store.store(ACCOUNT, &replacement).unwrap();
        assert_eq!(
            store.retrieve(ACCOUNT).unwrap().as_bytes(),
            replacement.as_bytes(),
            "{name}"
        );

        store.delete(ACCOUNT).unwrap();
        assert!(!store.exists(ACCOUNT), "{name}");
        store.delete(ACCOUNT).unwrap();
    }
}

#[test]
fn test_keys_cross_the_boundary_as_base64() {
    let runner = FakeKeyringRunner::shared();
    let store = KeychainStore::new(runner.clone());
    let key = EncryptionKey::from_bytes([1u8; 32]);
    store.store(ACCOUNT, &key).unwrap();

    let raw = runner.secret(&format!("{KEYSTORE_SERVICE}/{ACCOUNT}")).unwrap();
    assert_eq!(raw, key.to_base64().as_str());

    // `security` only accepts the secret on argv.
    let add = runner
        .calls()
        .into_iter()
        .find(|c| c.has_arg("add-generic-password"))
        .unwrap();
    let w = add.args.iter().position(|a| a == "-w").unwrap();
    assert_eq!(add.args[w + 1], raw);
    assert_eq!(add.stdin, None);
}

#[test]
fn test_secret_service_passes_secret_on_stdin() {
    let runner = FakeKeyringRunner::shared();
    let store = SecretServiceStore::new(runner.clone()).unwrap();
    let key = EncryptionKey::generate().unwrap();
    store.store(ACCOUNT, &key).unwrap();

    let encoded = key.to_base64();
    let call = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "secret-tool" && c.has_arg("store"))
        .unwrap();
    assert_eq!(call.stdin.as_deref(), Some(encoded.as_str()));
    assert!(!call.args.iter().any(|a| a.contains(encoded.as_str())));
    assert!(call.has_arg("SecLlama message-encryption-key"));
}

#[test]
fn test_missing_secret_tool_is_backend_unavailable() {
    let runner = ScriptedRunner::succeeding().without_program("secret-tool").shared();
    let err = SecretServiceStore::new(runner).unwrap_err();
    match err {
        SecurityError::BackendUnavailable { reason, .. } => assert!(reason.contains("libsecret")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_locked_secret_service_collection_is_not_a_missing_key() {
    let runner = ScriptedRunner::new(|_, args, _| {
        if args.first() == Some(&"lookup") {
            return Ok(secllama_security::command::CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: "Cannot create an item in a locked collection".to_string(),
            });
        }
        Ok(secllama_security::command::CommandOutput::with_status(0, ""))
    });
    let store = SecretServiceStore::new(Arc::new(runner)).unwrap();
    match store.retrieve(ACCOUNT) {
        Err(SecurityError::BackendUnavailable { backend, reason }) => {
            assert_eq!(backend, "secret-service");
            assert!(reason.contains("locked collection"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // A silent exit 1 is still a missing item.
    let quiet = ScriptedRunner::new(|_, _, _| {
        Ok(secllama_security::command::CommandOutput::with_status(1, ""))
    });
    let quiet = SecretServiceStore::new(Arc::new(quiet)).unwrap();
    assert!(matches!(
        quiet.retrieve(ACCOUNT),
        Err(SecurityError::NotFound { .. })
    ));
}

#[test]
fn test_helper_timeout_is_backend_unavailable() {
    let store = KeychainStore::new(ScriptedRunner::timing_out().shared());
    assert!(matches!(
        store.retrieve(ACCOUNT),
        Err(SecurityError::BackendUnavailable { .. })
    ));
    assert!(!store.exists(ACCOUNT));
}

#[test]
fn test_rejected_write_is_persistence_failure() {
    let runner = ScriptedRunner::new(|_, args, _| {
        let status = if args.first() == Some(&"add-generic-password") { 1 } else { 0 };
        Ok(secllama_security::command::CommandOutput::with_status(status, ""))
    });
    let store = KeychainStore::new(Arc::new(runner));
    let err = store
        .store(ACCOUNT, &EncryptionKey::generate().unwrap())
        .unwrap_err();
    assert!(matches!(err, SecurityError::PersistenceFailure { .. }));
}

#[test]
fn test_missing_powershell_module_is_reported() {
    let runner = ScriptedRunner::new(|program, _, _| {
        let status = if program == "powershell" { 3 } else { 0 };
        Ok(secllama_security::command::CommandOutput::with_status(status, ""))
    });
    let store = CredentialManagerStore::new(Arc::new(runner));
    match store.retrieve(ACCOUNT) {
        Err(SecurityError::BackendUnavailable { reason, .. }) => {
            assert!(reason.contains("CredentialManager"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_wrong_length_entry_is_invalid_key_size() {
    let store = MemorySecretStore::new();
    store.insert_raw(ACCOUNT, "AAAA");
    assert_eq!(
        store.retrieve(ACCOUNT).unwrap_err(),
        SecurityError::InvalidKeySize {
            expected: 32,
            actual: 3
        }
    );
}
