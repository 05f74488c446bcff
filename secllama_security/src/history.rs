//! Persisted input history with per-line encryption.
//!
//! One record per line. Each line is either plaintext or base64 ciphertext from
//! the [`KeyManager`]; a line counts as ciphertext only if it decodes *and*
//! authenticates, so files written before encryption was enabled (or under a
//! rotated key) still load, verbatim.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use directories::BaseDirs;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    error::{SecurityError, SecurityResult},
    manager::KeyManager,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
    limit: usize,
    manager: Option<Arc<KeyManager>>,
    encrypt: bool,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>, manager: Option<Arc<KeyManager>>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_HISTORY_LIMIT,
            manager,
            encrypt: true,
        }
    }

    /// `~/.secllama/history`
    pub fn default_path() -> SecurityResult<PathBuf> {
        let dirs = BaseDirs::new()
            .ok_or_else(|| SecurityError::Io("cannot determine the home directory".to_string()))?;
        Ok(dirs.home_dir().join(".secllama").join("history"))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `save` encrypts lines. Loading always recognizes ciphertext.
    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encrypt = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn ready_manager(&self) -> Option<&KeyManager> {
        let manager = self.manager.as_deref()?;
        match manager.initialize() {
            Ok(()) => Some(manager),
            Err(e) => {
                warn!("Key manager unavailable for history: {}", e);
                None
            }
        }
    }

    /// Read the newest `limit` entries. A missing file is an empty history.
    pub fn load(&self) -> SecurityResult<Vec<String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let manager = self.ready_manager();
        let mut entries: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| decode_line(manager, line))
            .collect();

        compact(&mut entries, self.limit);
        debug!("Loaded {} history entries from {:?}", entries.len(), self.path);
        Ok(entries)
    }

    /// Atomically replace the file with the newest `limit` entries.
    pub fn save(&self, entries: &[String]) -> SecurityResult<()> {
        let start = entries.len().saturating_sub(self.limit);
        let manager = if self.encrypt {
            self.ready_manager()
        } else {
            None
        };

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        // NamedTempFile is created with mode 0600 and lives beside the target,
        // so the rename below stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
            for entry in &entries[start..] {
                let line = match manager {
                    Some(manager) => encode_line(manager, entry),
                    None => entry.clone(),
                };
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| SecurityError::Io(e.error.to_string()))?;
        Ok(())
    }

    /// Load, append `entry`, trim and save. Returns the resulting history.
    pub fn append(&self, entry: &str) -> SecurityResult<Vec<String>> {
        let mut entries = self.load()?;
        entries.push(entry.to_string());
        compact(&mut entries, self.limit);
        self.save(&entries)?;
        Ok(entries)
    }
}

/// Lines that do not open are kept verbatim as plaintext.
fn decode_line(manager: Option<&KeyManager>, line: &str) -> String {
    let Some(manager) = manager else {
        return line.to_string();
    };
    match manager.decrypt(line) {
        Ok(text) => text,
        Err(e) => {
            if e.is_integrity_error() {
                debug!("History line does not open under the current key, keeping it verbatim");
            }
            line.to_string()
        }
    }
}

fn encode_line(manager: &KeyManager, line: &str) -> String {
    manager.encrypt(line).unwrap_or_else(|e| {
        warn!("Failed to encrypt history line, storing it unencrypted: {}", e);
        line.to_string()
    })
}

fn compact(entries: &mut Vec<String>, limit: usize) {
    if entries.len() > limit {
        let excess = entries.len() - limit;
        entries.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_keeps_newest() {
        let mut entries: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        compact(&mut entries, 3);
        assert_eq!(entries, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryFile::new(dir.path().join("history"), None);
        assert!(history.load().unwrap().is_empty());
    }
}
