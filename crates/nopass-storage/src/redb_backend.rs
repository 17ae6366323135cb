//! Persistent redb storage backend.
//!
//! redb is pure Rust, so the server builds without a C++ toolchain. Every
//! operation runs in its own transaction on the Tokio blocking pool.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{StorageBackend, StorageError};

/// All data lives in one table; key namespacing (`users/`, `refresh/`) is
/// the caller's concern.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("data");

/// A storage backend backed by a single redb database file.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_err(e: impl Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

impl RedbBackend {
    /// Open or create a redb database at `path`, creating parent directories
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be created or opened,
    /// or [`StorageError::Transaction`] if the data table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let open_err = |reason: String| StorageError::Open {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| open_err(e.to_string()))?;

        let txn = db.begin_write().map_err(txn_err)?;
        txn.open_table(DATA_TABLE).map_err(txn_err)?;
        txn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.display(), "redb storage opened");
        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a blocking redb operation off the async executor.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| txn_err(format!("blocking task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
            let value = table.get(key.as_str()).map_err(|e| StorageError::Read {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(txn_err)?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.blocking(move |db| {
            let list_err = |e: &dyn Display| StorageError::List {
                prefix: prefix.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(txn_err)?;

            let mut keys = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(|e| list_err(&e))? {
                let (k, _) = item.map_err(|e| list_err(&e))?;
                let key = k.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                keys.push(key.to_owned());
            }
            Ok(keys)
        })
        .await
    }
}
