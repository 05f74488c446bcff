//! Encrypted history file: migration, limits and atomic writes.

use std::sync::Arc;

use secllama_security::{HistoryFile, KeyManager, keystore::MemorySecretStore};

fn manager() -> Arc<KeyManager> {
    let manager = Arc::new(KeyManager::new(Arc::new(MemorySecretStore::new())));
    manager.initialize().unwrap();
    manager
}

#[test]
fn test_mixed_plaintext_and_ciphertext_lines_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    let manager = manager();

    let ciphertext = manager.encrypt("encrypted entry").unwrap();
    std::fs::write(&path, format!("legacy plain entry\n\n{ciphertext}\n")).unwrap();

    let history = HistoryFile::new(&path, Some(manager));
    assert_eq!(
        history.load().unwrap(),
        vec!["legacy plain entry", "encrypted entry"]
    );
}

#[test]
fn test_save_encrypts_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("history");
    let history = HistoryFile::new(&path, Some(manager()));

    history
        .save(&["first prompt".to_string(), "second prompt".to_string()])
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 2);
    assert!(!raw.contains("prompt"));
    assert_eq!(history.load().unwrap(), vec!["first prompt", "second prompt"]);
}

#[test]
fn test_base64_looking_plaintext_is_kept_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    std::fs::write(&path, "aGVsbG8gd29ybGQgdGhpcyBpcyBsb25nIGVub3VnaA==\n").unwrap();

    let history = HistoryFile::new(&path, Some(manager()));
    assert_eq!(
        history.load().unwrap(),
        vec!["aGVsbG8gd29ybGQgdGhpcyBpcyBsb25nIGVub3VnaA=="]
    );
}

#[test]
fn test_append_keeps_newest_entries() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryFile::new(dir.path().join("history"), Some(manager())).with_limit(3);

    for i in 0..5 {
        history.append(&format!("entry {i}")).unwrap();
    }
    assert_eq!(history.load().unwrap(), vec!["entry 2", "entry 3", "entry 4"]);
}

#[test]
fn test_without_encryption_lines_stay_plain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    let history = HistoryFile::new(&path, Some(manager())).with_encryption(false);

    history.append("visible").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "visible\n");
}

#[test]
fn test_history_without_manager_is_plain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    let history = HistoryFile::new(&path, None);

    history.append("no key here").unwrap();
    assert_eq!(history.load().unwrap(), vec!["no key here"]);
}

#[cfg(unix)]
#[test]
fn test_history_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history");
    HistoryFile::new(&path, Some(manager()))
        .append("private")
        .unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}
