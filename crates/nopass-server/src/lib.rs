//! No Pass HTTP server.
//!
//! Wires the core bridge, the storage backend and the HTTP routes into an
//! Axum router. Serves the bridge routes under `/api/*` and, when the
//! self-hosted directory is in use, its client surface under `/identity/v1/*`.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
