//! Persisted credential storage.
//!
//! SYSTEM CONTEXT
//! ==============
//! This is the only module that reads or writes the persisted token/profile
//! pair. The session store writes it; the HTTP client reads the token and,
//! on a `401`, calls [`SessionStorage::clear`]. Nothing else touches the
//! backend directly.
//!
//! DESIGN
//! ======
//! Backends model browser-style local storage: string values under string
//! keys. The pair is always written or removed in one [`StorageBackend::apply`]
//! batch, so a reader never sees a token without its profile.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::net::types::UserProfile;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bearer token and the profile it was issued for.
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub token: String,
    pub user: UserProfile,
}

/// One mutation inside an atomic [`StorageBackend::apply`] batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change<'a> {
    Set(&'a str, String),
    Remove(&'a str),
}

/// Key/value persistence under [`SessionStorage`].
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply every change or none of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn apply(&self, changes: &[Change<'_>]) -> Result<(), StorageError>;
}

// =============================================================================
// SESSION STORAGE
// =============================================================================

/// Cloneable handle shared by the session store and the HTTP client.
#[derive(Clone)]
pub struct SessionStorage {
    backend: Arc<dyn StorageBackend>,
}

impl SessionStorage {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self { backend: Arc::new(backend) }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    /// Read the persisted pair. Returns `None` unless both entries exist
    /// and the profile decodes.
    #[must_use]
    pub fn read_pair(&self) -> Option<Credentials> {
        let token = self.token()?;
        let raw_user = self.backend.get(USER_KEY)?;
        match serde_json::from_str::<UserProfile>(&raw_user) {
            Ok(user) => Some(Credentials { token, user }),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable persisted profile");
                None
            }
        }
    }

    /// The persisted bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.backend.get(TOKEN_KEY).filter(|token| !token.is_empty())
    }

    /// Persist a token/profile pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be encoded or the backend write fails.
    pub fn write_pair(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let user = serde_json::to_string(&credentials.user)?;
        self.backend
            .apply(&[Change::Set(TOKEN_KEY, credentials.token.clone()), Change::Set(USER_KEY, user)])
    }

    /// Replace the persisted profile, leaving the token untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be encoded or the backend write fails.
    pub fn write_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let user = serde_json::to_string(user)?;
        self.backend.apply(&[Change::Set(USER_KEY, user)])
    }

    /// Remove both entries. Failures are logged, not returned.
    pub fn clear(&self) {
        if let Err(e) = self.backend.apply(&[Change::Remove(TOKEN_KEY), Change::Remove(USER_KEY)]) {
            tracing::warn!(error = %e, "failed to clear persisted credentials");
        }
    }
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}

// =============================================================================
// BACKENDS
// =============================================================================

/// Process-local backend. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn apply(&self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        apply_changes(&mut entries, changes);
        Ok(())
    }
}

/// JSON object on disk, rewritten through a temp file and rename.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to read session file");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %self.path.display(), "ignoring corrupt session file");
            BTreeMap::new()
        })
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn apply(&self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load();
        apply_changes(&mut entries, changes);
        self.store(&entries)
    }
}

fn apply_changes(entries: &mut BTreeMap<String, String>, changes: &[Change<'_>]) {
    for change in changes {
        match change {
            Change::Set(key, value) => {
                entries.insert((*key).to_owned(), value.clone());
            }
            Change::Remove(key) => {
                entries.remove(*key);
            }
        }
    }
}

// The file holds a bearer token.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
