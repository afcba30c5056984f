//! Persisted credential blob.

use cohort_core::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Opaque credential blob that survives restarts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
}

impl StoredCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at_ms: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at_ms: i64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Where credentials live between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError>;
    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

fn storage_error(err: impl fmt::Display) -> SessionError {
    SessionError::CredentialStorage {
        reason: err.to_string(),
    }
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(storage_error)?;
        let credentials =
            serde_json::from_str::<StoredCredentials>(&contents).map_err(storage_error)?;
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_error)?;
        }
        let contents = serde_json::to_string_pretty(credentials).map_err(storage_error)?;
        write_owner_only(&self.path, contents.as_bytes()).map_err(storage_error)
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(err)),
        }
    }
}

/// On unix the file ends up mode 0600, also when it already existed.
fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.flush()
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            inner: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredCredentials>, SessionError> {
        let guard = self.inner.lock().map_err(|_| storage_error("lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().map_err(|_| storage_error("lock poisoned"))?;
        *guard = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().map_err(|_| storage_error("lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));
        assert_eq!(store.load().unwrap(), None);

        let creds = StoredCredentials::new("access").with_refresh_token("refresh");
        store.save(&creds).unwrap();
        assert_eq!(store.load().unwrap(), Some(creds));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileCredentialStore::new(&path)
            .save(&StoredCredentials::new("access"))
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        let err = FileCredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SessionError::CredentialStorage { .. }));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::with_credentials(StoredCredentials::new("a"));
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = StoredCredentials::new("secret-token").with_refresh_token("secret-refresh");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_expiry() {
        let creds = StoredCredentials::new("a").with_expiry(100);
        assert!(!creds.is_expired_at(99));
        assert!(creds.is_expired_at(100));
        assert!(!StoredCredentials::new("a").is_expired_at(i64::MAX));
    }
}
