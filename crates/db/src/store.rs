//! The user-storage seam used by the identity service handlers.
//!
//! [`PgUserStore`] is the production implementation backed by
//! [`UserRepo`]; [`MemoryUserStore`] keeps users in process memory for
//! tests and for running the service without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use stockdash_core::types::DbId;
use tokio::sync::RwLock;

use crate::models::user::{CreateUser, User};
use crate::repositories::UserRepo;
use crate::DbPool;

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors surfaced by a [`UserStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage operations required by register / login / verify-token.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, input: CreateUser) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError>;

    /// Confirm the backing storage is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// [`UserStore`] backed by the `users` table.
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, input: CreateUser) -> Result<User, StoreError> {
        UserRepo::create(&self.pool, &input).await.map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                tracing::info!(constraint = %constraint, "User insert rejected by unique constraint");
                StoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ))
            }
            other => StoreError::Database(other),
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_email(&self.pool, email).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_id(&self.pool, id).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}

/// In-process [`UserStore`]. Ids are assigned sequentially from 1.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryUsers>,
}

#[derive(Default)]
struct MemoryUsers {
    next_id: DbId,
    by_id: HashMap<DbId, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, input: CreateUser) -> Result<User, StoreError> {
        let mut users = self.inner.write().await;
        if users.by_id.values().any(|u| u.email == input.email) {
            tracing::info!(email = %input.email, "User insert rejected: email taken");
            return Err(StoreError::Conflict(
                "Duplicate value violates unique constraint: uq_users_email".into(),
            ));
        }

        users.next_id += 1;
        let user = User {
            id: users.next_id,
            email: input.email,
            password_hash: input.password_hash,
            is_admin: input.is_admin,
            created_at: Utc::now(),
        };
        users.by_id.insert(user.id, user.clone());
        tracing::debug!(user_id = user.id, "User stored in memory");
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.inner.read().await;
        Ok(users.by_id.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn new_user(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn memory_store_assigns_sequential_ids() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@example.com")).await.unwrap();
        let b = store.create(new_user("b@example.com")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();

        let result = store.create(new_user("a@example.com")).await;
        assert_matches!(result, Err(StoreError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn memory_store_lookups() {
        let store = MemoryUserStore::new();
        let created = store.create(new_user("a@example.com")).await.unwrap();

        let by_email = store.find_by_email("a@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
        assert!(store.find_by_email("missing@example.com").await.unwrap().is_none());
        assert!(store.find_by_id(created.id).await.unwrap().is_some());
        assert!(store.find_by_id(99).await.unwrap().is_none());
    }
}
