//! User entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use stockdash_core::session::UserInfo;
use stockdash_core::types::{DbId, Timestamp};

/// Full user row from the `users` table.
///
/// Contains the password hash -- NEVER serialize this to API responses directly.
/// Use [`UserInfo`] for external-facing output.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: Timestamp,
}

impl User {
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            email: self.email.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// DTO for creating a new user.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}
