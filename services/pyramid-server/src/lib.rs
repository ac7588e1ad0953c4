//! Pyramid store HTTP server.
//!
//! Serves a pyramid store directory over HTTP for read-only,
//! chunk-granular access by browser map clients, with cross-origin access
//! enabled. The server knows nothing about pyramid semantics; it is a
//! byte reflector over the store's files.

pub mod app;
pub mod config;

pub use app::{build_router, ServerError};
pub use config::{CorsPolicy, ServerConfig};
