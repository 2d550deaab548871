pub mod auth;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// All identity routes, mounted at `/user-api`.
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/user-api", auth::router())
}
