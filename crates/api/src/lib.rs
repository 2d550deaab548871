//! stockdash identity service library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! router) so integration tests, the client's tests and the binary
//! entrypoint can all assemble the same service.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;
