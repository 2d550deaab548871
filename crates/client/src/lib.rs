//! Client library for the stockdash job service and identity service.
//!
//! Provides the session manager, REST and push channel clients for the job
//! service, reconnection logic, and the job synchronization engine that
//! reconciles push, poll and fetch results into one board.

pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod messages;
mod processor;
pub mod reconnect;
pub mod state;
pub mod storage;
pub mod sync;

pub use auth::{AuthError, SessionManager};
pub use config::ClientConfig;
pub use storage::{FileSessionStore, MemorySessionStore, SessionStore};
pub use sync::{JobSyncEngine, SyncError, SyncEvent, SyncOptions};
