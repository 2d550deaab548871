//! Persistence for the authenticated session.
//!
//! The session manager only sees the [`SessionStore`] trait. The file store
//! keeps one JSON document under a fixed name; the memory store backs tests
//! and short-lived tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stockdash_core::session::Session;
use tokio::sync::RwLock;

/// File name of the persisted session inside the session directory.
pub const SESSION_FILE: &str = "auth-storage.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document exists but is not a valid session.
    #[error("Corrupt session data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Returns `Ok(None)` when nothing has been persisted.
    async fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Removing an absent session is not an error.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Keeps the session in process memory only.
#[derive(Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a session, as if persisted by an earlier run.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(self.session.read().await.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.session.write().await = None;
        Ok(())
    }
}

/// Persists the session as `auth-storage.json` inside a directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// The directory is created on first save.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, json).await?;
        tracing::debug!(path = %self.path.display(), "Session persisted");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Session>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
