//! Session and identity wire types shared by the identity service and
//! the client.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::DbId;

/// An authenticated identity plus its bearer credential.
///
/// Validity is decided by the identity service alone; holding a `Session`
/// does not mean the token is still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: DbId,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Opaque bearer token. Older persisted sessions may lack one.
    #[serde(default)]
    pub token: Option<String>,
}

impl Session {
    /// Identity string the job service expects in its `Authorization` header.
    pub fn owner_id(&self) -> String {
        self.id.to_string()
    }
}

/// Public user info returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: DbId,
    pub email: String,
    pub is_admin: bool,
}

/// Request body for both `POST /user-api/register` and `POST /user-api/login`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[serde(default)]
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Response body of `GET /user-api/verify-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTokenResponse {
    pub user: UserInfo,
}

/// Per-process random identifier that lets the job service route push
/// frames to this client. Regenerated every time the process starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(format!("client-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_prefixed_and_unique() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert!(a.as_str().starts_with("client-"));
        assert_ne!(a, b);
    }

    #[test]
    fn session_without_token_deserializes() {
        let json = r#"{"id":7,"email":"a@b.com","is_admin":false}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.token, None);
        assert_eq!(session.owner_id(), "7");
    }

    #[test]
    fn credentials_validation() {
        assert!(Credentials::new("trader@example.com", "pw").validate().is_ok());
        assert!(Credentials::new("not-an-email", "pw").validate().is_err());
        assert!(Credentials::new("trader@example.com", "").validate().is_err());
    }
}
