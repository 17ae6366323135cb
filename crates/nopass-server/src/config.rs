//! Server configuration for No Pass.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Credentials for the two identity providers have no defaults and must be
//! set; everything else can be overridden via `NOPASS_*` variables.

use std::net::SocketAddr;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{var} must be set")]
    Missing { var: &'static str },

    /// A variable is set to something unusable.
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Storage backend for the local directory.
    pub storage_backend: StorageBackendType,
    /// Which secondary identity system to talk to.
    pub directory: DirectoryKind,
    /// Primary provider's PEM public key for session verification.
    pub clerk_jwt_key: String,
    /// Allowed `azp` values; empty disables the check.
    pub clerk_authorized_parties: Vec<String>,
    /// Secondary identity system credentials.
    pub firebase: FirebaseConfig,
}

/// Service-account credentials for the secondary identity system.
#[derive(Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    /// Public half of the service-account key, required by the local
    /// directory to verify the tokens it issues.
    pub public_key: Option<String>,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"[redacted]")
            .field("public_key", &self.public_key.is_some())
            .finish()
    }
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
}

/// Supported secondary identity systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    /// Self-hosted directory over the configured storage backend.
    Local,
    /// Google Identity Toolkit (feature `identity-toolkit`).
    IdentityToolkit,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `NOPASS_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:3000`)
    /// - `PORT`: port to bind on, binds to `0.0.0.0`
    /// - `NOPASS_LOG_LEVEL`: log filter (default: `info`)
    /// - `NOPASS_STORAGE`: `memory` or `redb` (default: `memory`)
    /// - `NOPASS_STORAGE_PATH`: redb file (default: `./data/nopass.redb`)
    /// - `NOPASS_DIRECTORY`: `local` or `identity-toolkit` (default: `local`)
    /// - `CLERK_JWT_KEY`: PEM public key for session tokens (required)
    /// - `CLERK_AUTHORIZED_PARTIES`: comma-separated `azp` allow-list
    /// - `FIREBASE_PROJECT_ID`, `FIREBASE_CLIENT_EMAIL`, `FIREBASE_PRIVATE_KEY` (required)
    /// - `FIREBASE_PUBLIC_KEY`: required with the local directory
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing credentials or unknown values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| var(key).ok_or(ConfigError::Missing { var: key });

        // Priority: NOPASS_BIND_ADDR > PORT > default 127.0.0.1:3000
        let bind_addr = if let Some(addr) = var("NOPASS_BIND_ADDR") {
            addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "NOPASS_BIND_ADDR",
                reason: e.to_string(),
            })?
        } else if let Some(port) = var("PORT") {
            let port: u16 = port.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "PORT",
                    reason: e.to_string(),
                }
            })?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 3000))
        };

        let log_level = var("NOPASS_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let storage_path =
            var("NOPASS_STORAGE_PATH").unwrap_or_else(|| "./data/nopass.redb".to_owned());
        let storage_backend = match var("NOPASS_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            "redb" => StorageBackendType::Redb { path: storage_path },
            other => {
                return Err(ConfigError::Invalid {
                    var: "NOPASS_STORAGE",
                    reason: format!("unknown backend '{other}'"),
                });
            }
        };

        let directory = match var("NOPASS_DIRECTORY")
            .unwrap_or_else(|| "local".to_owned())
            .to_lowercase()
            .as_str()
        {
            "local" => DirectoryKind::Local,
            "identity-toolkit" | "identitytoolkit" | "firebase" => DirectoryKind::IdentityToolkit,
            other => {
                return Err(ConfigError::Invalid {
                    var: "NOPASS_DIRECTORY",
                    reason: format!("unknown directory '{other}'"),
                });
            }
        };

        let clerk_authorized_parties = var("CLERK_AUTHORIZED_PARTIES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let firebase = FirebaseConfig {
            project_id: require("FIREBASE_PROJECT_ID")?,
            client_email: require("FIREBASE_CLIENT_EMAIL")?,
            private_key: require("FIREBASE_PRIVATE_KEY")?,
            public_key: var("FIREBASE_PUBLIC_KEY"),
        };
        if directory == DirectoryKind::Local && firebase.public_key.is_none() {
            return Err(ConfigError::Missing {
                var: "FIREBASE_PUBLIC_KEY",
            });
        }

        Ok(Self {
            bind_addr,
            log_level,
            storage_backend,
            directory,
            clerk_jwt_key: require("CLERK_JWT_KEY")?,
            clerk_authorized_parties,
            firebase,
        })
    }
}
