//! Durable local state: one keystore record and one session token.
//!
//! The [`Keyring`] trait is the engine's only durable-storage seam. It
//! holds exactly two strings - the JSON keystore record and the bearer
//! token - mirroring the two slots the original client kept in browser
//! local storage. [`FsKeyring`] persists them as files with
//! replace-in-place writes so a crash can never leave a partial record
//! observable; [`MemoryKeyring`] backs tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StorageError;

/// Durable storage for the keystore record and session token.
pub trait Keyring: Send + Sync + 'static {
    /// Load the keystore record, if one is persisted.
    fn load_keys(&self) -> Result<Option<String>, StorageError>;

    /// Persist the keystore record, replacing any previous one atomically.
    fn store_keys(&self, record: &str) -> Result<(), StorageError>;

    /// Remove the keystore record.
    fn clear_keys(&self) -> Result<(), StorageError>;

    /// Load the session token, if one is persisted.
    fn load_token(&self) -> Result<Option<String>, StorageError>;

    /// Persist the session token.
    fn store_token(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the session token.
    fn clear_token(&self) -> Result<(), StorageError>;
}

const KEYS_FILE: &str = "keys.json";
const TOKEN_FILE: &str = "token";

/// Filesystem keyring rooted at a directory.
pub struct FsKeyring {
    dir: PathBuf,
}

impl FsKeyring {
    /// Create a keyring rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.dir.join(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename, so readers observe either the old
    /// or the new contents, never a prefix.
    fn write_atomic(&self, name: &str, contents: &str) -> Result<(), StorageError> {
        let tmp = self.dir.join(format!(".{name}.tmp"));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The directory this keyring persists into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Keyring for FsKeyring {
    fn load_keys(&self) -> Result<Option<String>, StorageError> {
        self.read_optional(KEYS_FILE)
    }

    fn store_keys(&self, record: &str) -> Result<(), StorageError> {
        self.write_atomic(KEYS_FILE, record)
    }

    fn clear_keys(&self) -> Result<(), StorageError> {
        self.remove(KEYS_FILE)
    }

    fn load_token(&self) -> Result<Option<String>, StorageError> {
        self.read_optional(TOKEN_FILE)
    }

    fn store_token(&self, token: &str) -> Result<(), StorageError> {
        self.write_atomic(TOKEN_FILE, token)
    }

    fn clear_token(&self) -> Result<(), StorageError> {
        self.remove(TOKEN_FILE)
    }
}

#[derive(Default)]
struct MemoryState {
    keys: Option<String>,
    token: Option<String>,
}

/// In-memory keyring for tests. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryKeyring {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryKeyring {
    /// Create an empty in-memory keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Keyring for MemoryKeyring {
    fn load_keys(&self) -> Result<Option<String>, StorageError> {
        Ok(self.state().keys.clone())
    }

    fn store_keys(&self, record: &str) -> Result<(), StorageError> {
        self.state().keys = Some(record.to_string());
        Ok(())
    }

    fn clear_keys(&self) -> Result<(), StorageError> {
        self.state().keys = None;
        Ok(())
    }

    fn load_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.state().token.clone())
    }

    fn store_token(&self, token: &str) -> Result<(), StorageError> {
        self.state().token = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<(), StorageError> {
        self.state().token = None;
        Ok(())
    }
}
