//! Client side of the session lifecycle.
//!
//! [`SessionManager`] talks to the identity service, keeps the current
//! [`Session`] in memory and mirrors it into a [`SessionStore`]. It is
//! either anonymous or authenticated; it never signs itself out. Callers
//! decide what a failed [`SessionManager::verify_token`] means.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use stockdash_core::session::{Credentials, Session, VerifyTokenResponse};
use tokio::sync::RwLock;

use crate::config::ClientConfig;
use crate::storage::{SessionStore, StorageError};

const LOGIN_FALLBACK: &str = "Login failed";
const REGISTER_FALLBACK: &str = "Registration failed";

/// Errors from the session lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identity service answered with a non-2xx status.
    #[error("{message} ({status})")]
    Rejected { status: u16, message: String },

    /// The request never produced a usable response.
    #[error("Identity service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The session could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error envelope produced by the identity service.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Holds the current session and the operations that change it.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    verify_timeout: Duration,
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<Session>>,
}

impl SessionManager {
    /// Create an anonymous manager. Call [`restore`](Self::restore) to pick
    /// up a previously persisted session.
    pub fn new(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.user_api_url.trim_end_matches('/').to_string(),
            verify_timeout: config.verify_timeout,
            store,
            current: RwLock::new(None),
        })
    }

    /// Load the persisted session, if any, into memory.
    ///
    /// Unreadable or corrupt persisted data is logged and treated as
    /// anonymous.
    pub async fn restore(&self) -> Option<Session> {
        match self.store.load().await {
            Ok(session) => {
                if let Some(ref s) = session {
                    tracing::info!(user_id = s.id, "Restored persisted session");
                }
                self.current.write().await.clone_from(&session);
                session
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        }
    }

    /// POST `/user-api/login`. On failure the stored session is untouched.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.authenticate("login", email, password, LOGIN_FALLBACK)
            .await
    }

    /// POST `/user-api/register`. Admin status is decided by the server.
    pub async fn register(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.authenticate("register", email, password, REGISTER_FALLBACK)
            .await
    }

    /// Drop the session from memory and from the store. Idempotent.
    pub async fn sign_out(&self) {
        let previous = self.current.write().await.take();
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
        if let Some(session) = previous {
            tracing::info!(user_id = session.id, "Signed out");
        }
    }

    /// `Authorization: Bearer <token>` when a token is held, otherwise empty.
    pub async fn auth_header(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = self.token().await;
        if let Some(value) = token.and_then(|t| HeaderValue::from_str(&format!("Bearer {t}")).ok())
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Ask the identity service whether the held token is still accepted.
    ///
    /// Fails closed: no token, a transport error, a timeout or a non-2xx
    /// answer all yield `false`. The held session is never cleared here.
    pub async fn verify_token(&self) -> bool {
        let Some(token) = self.token().await else {
            return false;
        };

        let request = self
            .http
            .get(format!("{}/user-api/verify-token", self.base_url))
            .bearer_auth(token)
            .send();

        let response = match tokio::time::timeout(self.verify_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Token verification request failed");
                return false;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.verify_timeout.as_millis() as u64,
                    "Token verification timed out",
                );
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::info!(status = response.status().as_u16(), "Token rejected");
            return false;
        }

        match response.json::<VerifyTokenResponse>().await {
            Ok(body) => {
                tracing::debug!(user_id = body.user.id, "Token verified");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed verify-token response");
                false
            }
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Identity string the job service expects in its `Authorization` header.
    pub async fn owner_id(&self) -> Option<String> {
        self.current.read().await.as_ref().map(Session::owner_id)
    }

    // ---- private helpers ----

    async fn token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .and_then(|s| s.token.clone())
    }

    async fn authenticate(
        &self,
        action: &'static str,
        email: &str,
        password: &str,
        fallback: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(format!("{}/user-api/{action}", self.base_url))
            .json(&Credentials::new(email, password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| fallback.to_string());
            tracing::info!(action, status = status.as_u16(), %message, "Authentication rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: Session = response.json().await?;
        self.store.save(&session).await?;
        *self.current.write().await = Some(session.clone());

        tracing::info!(action, user_id = session.id, is_admin = session.is_admin, "Authenticated");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySessionStore;

    fn manager_with(store: MemorySessionStore) -> SessionManager {
        SessionManager::new(&ClientConfig::default(), Arc::new(store)).unwrap()
    }

    fn session(token: Option<&str>) -> Session {
        Session {
            id: 42,
            email: "alice@example.com".into(),
            is_admin: false,
            token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn anonymous_manager_has_empty_header() {
        let manager = manager_with(MemorySessionStore::new());
        assert!(manager.auth_header().await.is_empty());
        assert_eq!(manager.owner_id().await, None);
    }

    #[tokio::test]
    async fn restored_session_projects_bearer_header() {
        let manager = manager_with(MemorySessionStore::with_session(session(Some("abc"))));
        manager.restore().await;

        let headers = manager.auth_header().await;
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(manager.owner_id().await.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn session_without_token_has_empty_header() {
        let manager = manager_with(MemorySessionStore::with_session(session(None)));
        manager.restore().await;

        assert!(manager.is_authenticated().await);
        assert!(manager.auth_header().await.is_empty());
        assert!(!manager.verify_token().await);
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() {
        let store = Arc::new(MemorySessionStore::with_session(session(Some("abc"))));
        let manager = SessionManager::new(&ClientConfig::default(), store.clone()).unwrap();
        manager.restore().await;

        manager.sign_out().await;
        manager.sign_out().await;

        assert_eq!(manager.current().await, None);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
