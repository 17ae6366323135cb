//! Storage backend abstraction for No Pass.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface used by the self-hosted identity directory to persist user
//! records and refresh-token bindings. It knows nothing about identities,
//! claims, or tokens.
//!
//! Two implementations are provided:
//!
//! - [`RedbBackend`]: persistent, pure-Rust, backed by redb (feature `redb-backend`)
//! - [`MemoryBackend`]: in-memory, for development and tests

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `users/user_123`,
/// `refresh/9f86d0...`). Values are opaque byte arrays; callers decide the
/// encoding (the directory stores JSON).
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
