//! Single-initialization holder for the secondary identity client.
//!
//! The client is built once and handed to whoever needs it. A second
//! `initialize` is an error rather than a silent replacement.

use std::sync::{Arc, OnceLock};

use crate::error::AppInitError;

/// Named, write-once slot for a secondary client of type `C`.
pub struct SecondaryApp<C> {
    name: String,
    client: OnceLock<Arc<C>>,
}

impl<C> std::fmt::Debug for SecondaryApp<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryApp")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl<C> SecondaryApp<C> {
    /// An empty app slot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }

    /// Install `client`.
    ///
    /// # Errors
    ///
    /// Returns [`AppInitError::AlreadyInitialized`] if a client is already
    /// installed; the existing client is kept.
    pub fn initialize(&self, client: C) -> Result<Arc<C>, AppInitError> {
        let installed = Arc::new(client);
        self.client
            .set(Arc::clone(&installed))
            .map_err(|_| AppInitError::AlreadyInitialized {
                name: self.name.clone(),
            })?;
        Ok(installed)
    }

    /// The installed client, building it with `init` on first use.
    pub fn get_or_init(&self, init: impl FnOnce() -> C) -> Arc<C> {
        Arc::clone(self.client.get_or_init(|| Arc::new(init())))
    }

    /// The installed client, if any.
    #[must_use]
    pub fn client(&self) -> Option<Arc<C>> {
        self.client.get().cloned()
    }
}
