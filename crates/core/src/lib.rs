//! Shared domain types for the stockdash workspace.
//!
//! Holds the job model and its merge rules, the reconciled job board,
//! session and wire types for the identity service, and the error type
//! both the server and the client build on.

pub mod board;
pub mod error;
pub mod job;
pub mod session;
pub mod types;
