//! Handlers for the `/user-api` resource (register, login, verify-token).

use axum::extract::State;
use axum::Json;
use stockdash_core::error::CoreError;
use stockdash_core::session::{Credentials, Session, UserInfo, VerifyTokenResponse};
use stockdash_db::models::user::CreateUser;
use stockdash_db::StoreError;
use validator::Validate;

use crate::auth::jwt::generate_token;
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// POST /user-api/register
///
/// Create an account and return a session. The account is an admin when
/// the email matches the configured `ADMIN_EMAIL`.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<Credentials>,
) -> AppResult<Json<Session>> {
    if input.email.trim().is_empty() || input.password.is_empty() {
        return Err(CoreError::Validation("Email and password are required".into()).into());
    }
    input
        .validate()
        .map_err(|e| CoreError::Validation(validation_message(&e)))?;

    if state.users.find_by_email(&input.email).await?.is_some() {
        tracing::info!(email = %input.email, "Registration rejected: user exists");
        return Err(CoreError::UserExists.into());
    }

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    let is_admin = state.config.is_admin_email(&input.email);

    let user = state
        .users
        .create(CreateUser {
            email: input.email,
            password_hash,
            is_admin,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration for the same email.
            StoreError::Conflict(_) => AppError::Core(CoreError::UserExists),
            other => AppError::Store(other),
        })?;

    tracing::info!(user_id = user.id, is_admin, "User registered");
    Ok(Json(issue_session(&state, user.info())?))
}

/// POST /user-api/login
///
/// Authenticate with email + password. Unknown emails and wrong passwords
/// get the same 401 response.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<Credentials>,
) -> AppResult<Json<Session>> {
    let user = state
        .users
        .find_by_email(&input.email)
        .await?
        .ok_or(CoreError::InvalidCredentials)?;

    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        tracing::info!(user_id = user.id, "Login rejected: wrong password");
        return Err(CoreError::InvalidCredentials.into());
    }

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(issue_session(&state, user.info())?))
}

/// GET /user-api/verify-token
///
/// Confirms the bearer token is valid and still belongs to an existing user.
pub async fn verify_token(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<VerifyTokenResponse>> {
    let user = state
        .users
        .find_by_id(auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;

    Ok(Json(VerifyTokenResponse { user: user.info() }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn issue_session(state: &AppState, user: UserInfo) -> AppResult<Session> {
    let token = generate_token(&user, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    Ok(Session {
        id: user.id,
        email: user.email,
        is_admin: user.is_admin,
        token: Some(token),
    })
}

/// First human-readable message out of a validator error set.
fn validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request".to_string())
}
