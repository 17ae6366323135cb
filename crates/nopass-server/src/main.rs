//! No Pass server entry point.
//!
//! Loads `.env.local` / `.env`, builds the session verifier and the
//! secondary identity directory from configuration, then starts the Axum
//! HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use nopass_core::{
    ClerkSessionVerifier, IdentityBridge, IdentityDirectory, LocalDirectory, ServiceAccount,
    TokenSigner,
};
use nopass_storage::{MemoryBackend, StorageBackend};

use nopass_server::config::{DirectoryKind, ServerConfig, StorageBackendType};
use nopass_server::routes;
use nopass_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Later files do not override earlier ones, nor the real environment.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        directory = ?config.directory,
        storage = ?config.storage_backend,
        project_id = %config.firebase.project_id,
        "No Pass starting"
    );

    let state = build_app_state(&config)?;
    let app = routes::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "No Pass server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("No Pass server stopped");
    Ok(())
}

/// Build the shared application state.
fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let verifier = ClerkSessionVerifier::from_pem(&config.clerk_jwt_key)
        .context("failed to load CLERK_JWT_KEY")?
        .with_authorized_parties(config.clerk_authorized_parties.clone());

    let account = ServiceAccount::new(
        config.firebase.project_id.clone(),
        config.firebase.client_email.clone(),
        &config.firebase.private_key,
    );
    let mut signer = TokenSigner::new(account).context("failed to load FIREBASE_PRIVATE_KEY")?;
    if let Some(public_key) = &config.firebase.public_key {
        signer = signer
            .with_public_key(public_key)
            .context("failed to load FIREBASE_PUBLIC_KEY")?;
    }
    let signer = Arc::new(signer);

    let (directory, local_directory): (Arc<dyn IdentityDirectory>, _) = match config.directory {
        DirectoryKind::Local => {
            let storage = open_storage(&config.storage_backend)?;
            let local = Arc::new(
                LocalDirectory::new(storage, signer).context("failed to start local directory")?,
            );
            (local.clone(), Some(local))
        }
        #[cfg(feature = "identity-toolkit")]
        DirectoryKind::IdentityToolkit => {
            info!("using Identity Toolkit directory");
            let remote = nopass_core::identity_toolkit::IdentityToolkitDirectory::new(signer);
            (Arc::new(remote), None)
        }
        #[cfg(not(feature = "identity-toolkit"))]
        DirectoryKind::IdentityToolkit => {
            anyhow::bail!(
                "identity-toolkit directory requested but feature 'identity-toolkit' is not enabled"
            );
        }
    };

    Ok(Arc::new(AppState {
        bridge: IdentityBridge::new(Arc::new(verifier), directory),
        local_directory,
    }))
}

/// Open the storage backend for the local directory.
fn open_storage(backend: &StorageBackendType) -> anyhow::Result<Arc<dyn StorageBackend>> {
    Ok(match backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Arc::new(nopass_storage::RedbBackend::open(path).context("failed to open redb storage")?)
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
    })
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
