//! Shared application state for the No Pass server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use nopass_core::{IdentityBridge, LocalDirectory};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Session verification, minting and claims sync.
    pub bridge: IdentityBridge,
    /// The self-hosted directory, when it is the secondary system. Its
    /// client surface is only served in that case.
    pub local_directory: Option<Arc<LocalDirectory>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("local_directory", &self.local_directory.is_some())
            .finish_non_exhaustive()
    }
}
