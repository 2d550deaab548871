use std::sync::Arc;

use stockdash_db::UserStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// User storage (Postgres in production, in-memory in tests).
    pub users: Arc<dyn UserStore>,
    /// Server configuration (JWT settings, admin email).
    pub config: Arc<ServerConfig>,
}
