//! Best-effort storage for the user's vendor API key.
//!
//! The key always lives in memory for the session. It is written to a backend
//! only when the user opts in with [`CredentialStore::set_remember`]. Backend
//! failures never surface as errors: the store keeps working in memory and
//! reports the degradation through [`CredentialStore::status`].

use secrecy::{ExposeSecret, SecretString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Name of the persisted entry.
pub const CREDENTIAL_KEY: &str = "imagen4_api_key";

/// Where a remembered key is kept.
pub trait CredentialBackend: Send + Sync {
    /// Reads the stored key, if any.
    fn load(&self) -> io::Result<Option<String>>;

    /// Stores the key, replacing any previous value.
    fn save(&self, value: &str) -> io::Result<()>;

    /// Deletes the stored key. Deleting a missing key is not an error.
    fn remove(&self) -> io::Result<()>;
}

/// Stores the key in a single file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Uses the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/imagen/imagen4_api_key`, if the platform has a config dir.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("imagen").join(CREDENTIAL_KEY)))
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(value) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, value: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, value)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-process backend, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    value: Mutex<Option<String>>,
    unavailable: bool,
}

impl MemoryBackend {
    /// An empty, working backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
            unavailable: false,
        }
    }

    /// A backend whose every operation fails, like blocked storage.
    pub fn unavailable() -> Self {
        Self {
            value: Mutex::new(None),
            unavailable: true,
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.unavailable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "storage unavailable",
            ));
        }
        Ok(())
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> io::Result<Option<String>> {
        self.check()?;
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, value: &str) -> io::Result<()> {
        self.check()?;
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        self.check()?;
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Outcome of the last persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceStatus {
    /// The key is stored in the backend.
    Persisted,
    /// The key lives in memory only, as requested.
    SessionOnly,
    /// The backend failed; the key lives in memory only.
    Unavailable {
        /// What went wrong.
        reason: String,
    },
}

impl PersistenceStatus {
    /// Returns true if the last backend operation failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl std::fmt::Display for PersistenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persisted => write!(f, "saved"),
            Self::SessionOnly => write!(f, "session only"),
            Self::Unavailable { reason } => write!(f, "not saved ({reason})"),
        }
    }
}

/// Holds the user's API key for direct mode.
pub struct CredentialStore {
    session: Option<SecretString>,
    remember: bool,
    backend: Option<Box<dyn CredentialBackend>>,
    status: PersistenceStatus,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("has_key", &self.session.is_some())
            .field("remember", &self.remember)
            .field("status", &self.status)
            .finish()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::session_only()
    }
}

impl CredentialStore {
    /// A store with no backend; nothing outlives the process.
    pub fn session_only() -> Self {
        Self {
            session: None,
            remember: false,
            backend: None,
            status: PersistenceStatus::SessionOnly,
        }
    }

    /// A store over `backend`, loading a previously remembered key.
    ///
    /// A key found in the backend turns `remember` on.
    pub fn with_backend(backend: impl CredentialBackend + 'static) -> Self {
        let mut store = Self {
            session: None,
            remember: false,
            backend: Some(Box::new(backend)),
            status: PersistenceStatus::SessionOnly,
        };

        let loaded = store.backend.as_ref().map(|b| b.load());
        match loaded {
            Some(Ok(Some(value))) if !value.is_empty() => {
                store.session = Some(SecretString::from(value));
                store.remember = true;
                store.status = PersistenceStatus::Persisted;
            }
            Some(Err(e)) => store.degrade("load", e),
            _ => {}
        }

        store
    }

    /// A file-backed store at `path`, or at the default location when `None`.
    pub fn open(path: Option<PathBuf>) -> Self {
        match path.map(FileBackend::new).or_else(FileBackend::default_location) {
            Some(backend) => Self::with_backend(backend),
            None => {
                let mut store = Self::session_only();
                store.status = PersistenceStatus::Unavailable {
                    reason: "no configuration directory".into(),
                };
                store
            }
        }
    }

    /// Returns the current key.
    pub fn get(&self) -> Option<&SecretString> {
        self.session.as_ref()
    }

    /// Returns true if a non-blank key is held.
    pub fn has_key(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Replaces the key, writing it through when `remember` is on.
    pub fn set(&mut self, value: impl Into<String>) -> &PersistenceStatus {
        let value = value.into();
        if value.is_empty() {
            self.session = None;
            if self.remember {
                self.with_backend_op("remove", |b| b.remove());
            }
            return &self.status;
        }

        if self.remember {
            self.with_backend_op("save", |b| b.save(&value));
        }
        self.session = Some(SecretString::from(value));
        &self.status
    }

    /// Replaces the key for this session only, leaving any remembered key
    /// in the backend untouched. An empty value drops the session key.
    pub fn set_for_session(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.session = (!value.is_empty()).then(|| SecretString::from(value));
    }

    /// Forgets the key, in memory and in the backend.
    pub fn clear(&mut self) -> &PersistenceStatus {
        self.session = None;
        self.with_backend_op("remove", |b| b.remove());
        if !self.status.is_degraded() {
            self.status = PersistenceStatus::SessionOnly;
        }
        &self.status
    }

    /// Turns persistence on (saving the current key) or off (deleting it).
    pub fn set_remember(&mut self, remember: bool) -> &PersistenceStatus {
        self.remember = remember;
        if remember {
            let value = self
                .session
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_default();
            self.with_backend_op("save", |b| b.save(&value));
        } else {
            self.with_backend_op("remove", |b| b.remove());
            if !self.status.is_degraded() {
                self.status = PersistenceStatus::SessionOnly;
            }
        }
        &self.status
    }

    /// Returns true if the user opted in to persistence.
    pub fn remembers(&self) -> bool {
        self.remember
    }

    /// Outcome of the last persistence attempt.
    pub fn status(&self) -> &PersistenceStatus {
        &self.status
    }

    fn with_backend_op<F>(&mut self, op: &'static str, f: F)
    where
        F: FnOnce(&dyn CredentialBackend) -> io::Result<()>,
    {
        let Some(backend) = self.backend.as_deref() else {
            if self.remember {
                self.status = PersistenceStatus::Unavailable {
                    reason: "no persistent storage configured".into(),
                };
            }
            return;
        };

        match f(backend) {
            Ok(()) if op == "save" => self.status = PersistenceStatus::Persisted,
            Ok(()) => self.status = PersistenceStatus::SessionOnly,
            Err(e) => self.degrade(op, e),
        }
    }

    fn degrade(&mut self, op: &'static str, e: io::Error) {
        tracing::warn!(op, error = %e, "credential storage unavailable, keeping key for this session only");
        self.status = PersistenceStatus::Unavailable {
            reason: e.to_string(),
        };
    }
}
