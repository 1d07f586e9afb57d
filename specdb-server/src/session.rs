//! Server-side sessions
//!
//! A session carries the guest-mode flag and, while an import is in
//! progress, the serialized [`ImportSession`]. Clients hold only the id and
//! send it in the `x-session-id` header.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use specdb_core::ImportSession;

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Sessions untouched for this long are dropped.
const IDLE_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown or expired session '{0}'")]
    Unknown(String),

    #[error("stored import could not be read: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug)]
struct SessionData {
    guest: bool,
    import: Option<String>,
    touched: Instant,
}

impl SessionData {
    fn new() -> Self {
        Self {
            guest: false,
            import: None,
            touched: Instant::now(),
        }
    }
}

/// In-memory session table.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new session id, pruning idle sessions.
    pub async fn create(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.touched.elapsed() < IDLE_LIMIT);
        if sessions.len() < before {
            tracing::debug!(pruned = before - sessions.len(), "dropped idle sessions");
        }
        sessions.insert(id.clone(), SessionData::new());
        id
    }

    async fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SessionData) -> T,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .filter(|s| s.touched.elapsed() < IDLE_LIMIT)
            .ok_or_else(|| SessionError::Unknown(id.to_owned()))?;
        session.touched = Instant::now();
        Ok(f(session))
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.with_session(id, |_| ()).await.is_ok()
    }

    pub async fn set_guest(&self, id: &str, guest: bool) -> Result<(), SessionError> {
        self.with_session(id, |s| s.guest = guest).await
    }

    /// Guest flag of `id`; unknown sessions are not guests.
    pub async fn is_guest(&self, id: Option<&str>) -> bool {
        match id {
            Some(id) => self.with_session(id, |s| s.guest).await.unwrap_or(false),
            None => false,
        }
    }

    pub async fn load_import(&self, id: &str) -> Result<Option<ImportSession>, SessionError> {
        let json = self.with_session(id, |s| s.import.clone()).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn save_import(&self, id: &str, import: &ImportSession) -> Result<(), SessionError> {
        let json = serde_json::to_string(import)?;
        self.with_session(id, |s| s.import = Some(json)).await
    }

    /// Drop the import in progress. Returns whether there was one.
    pub async fn clear_import(&self, id: &str) -> Result<bool, SessionError> {
        self.with_session(id, |s| s.import.take().is_some()).await
    }
}
