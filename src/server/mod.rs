//! HTTP server providing the cache admin API.
//!
//! - [`admin_api`]: Request/response types and route handlers
//! - [`streaming`]: SSE feed of cache events

pub mod admin_api;
pub mod streaming;

pub use admin_api::{build_router, AppState};
