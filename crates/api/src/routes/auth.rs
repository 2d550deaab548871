//! Route definitions for the identity endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/user-api`.
///
/// ```text
/// POST /register      -> register
/// POST /login         -> login
/// GET  /verify-token  -> verify_token (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify-token", get(auth::verify_token))
}
