//! Conditional-token store: one persisted `Last-Modified` value.
//!
//! # Design
//! The stored value is the literal `Last-Modified` text of the last image
//! that was fully flashed and finalized. It feeds `If-Modified-Since` on the
//! next pull. `load` never fails: an unreadable slot just means the next
//! request is unconditional. `save` errors are surfaced so the caller can
//! tell "update applied, bookkeeping failed" apart from a failed update.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOKEN_FILE: &str = "firmware.date";

pub trait TokenStore {
    fn load(&self) -> Option<String>;
    fn save(&mut self, token: &str) -> io::Result<()>;
}

/// Single-file slot on the device filesystem.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::debug!("no conditional token at {}: {err}", self.path.display());
                return None;
            }
        };
        // Older firmware wrote the C string terminator into the file.
        let text = String::from_utf8_lossy(&bytes);
        let token = text.trim_end_matches('\0').trim_end_matches(['\r', '\n']);
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    fn save(&mut self, token: &str) -> io::Result<()> {
        fs::write(&self.path, token.as_bytes())
    }
}

/// In-memory slot for hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    pub token: Option<String>,
    /// When set, `save` fails with this message.
    pub fail_saves: Option<String>,
}

impl MemoryTokenStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            fail_saves: None,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty())
    }

    fn save(&mut self, token: &str) -> io::Result<()> {
        if let Some(msg) = &self.fail_saves {
            return Err(io::Error::other(msg.clone()));
        }
        self.token = Some(token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("firmware.date"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileTokenStore::new(dir.path().join("firmware.date"));
        store.save("Tue, 15 Nov 1994 08:12:31 GMT").unwrap();
        assert_eq!(store.load().as_deref(), Some("Tue, 15 Nov 1994 08:12:31 GMT"));
    }

    #[test]
    fn legacy_nul_terminator_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.date");
        fs::write(&path, b"Tue\0").unwrap();
        assert_eq!(FileTokenStore::new(&path).load().as_deref(), Some("Tue"));
    }

    #[test]
    fn token_text_is_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.date");
        let mut store = FileTokenStore::new(&path);
        store.save(" Tue,  15 Nov 1994 ").unwrap();
        assert_eq!(store.load().as_deref(), Some(" Tue,  15 Nov 1994 "));

        fs::write(&path, b"Tue\r\n\0").unwrap();
        assert_eq!(store.load().as_deref(), Some("Tue"));
    }

    #[test]
    fn empty_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.date");
        fs::write(&path, b"").unwrap();
        assert_eq!(FileTokenStore::new(&path).load(), None);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileTokenStore::new(dir.path().join("nope").join("firmware.date"));
        assert!(store.save("Tue").is_err());
    }

    #[test]
    fn memory_store_can_fail_saves() {
        let mut store = MemoryTokenStore {
            token: Some("old".to_string()),
            fail_saves: Some("flash full".to_string()),
        };
        assert!(store.save("new").is_err());
        assert_eq!(store.load().as_deref(), Some("old"));
    }
}
