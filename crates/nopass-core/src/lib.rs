//! Core library for No Pass.
//!
//! Bridges a primary identity provider session into a secondary identity
//! system:
//!
//! - [`session`]: verifies primary-provider session tokens.
//! - [`minter`]: mints custom tokens for a verified subject.
//! - [`claims`]: writes the subject claim onto the secondary user record.
//! - [`service`]: the two server operations built from the above.
//! - [`bridge`]: the client-side orchestration and its observable outcome.
//!
//! The secondary system sits behind [`directory::IdentityDirectory`], either
//! the self-hosted [`local_directory::LocalDirectory`] or, with the
//! `identity-toolkit` feature, the remote Identity Toolkit directory.

pub mod app;
pub mod bridge;
pub mod claims;
pub mod directory;
pub mod error;
#[cfg(feature = "identity-toolkit")]
pub mod identity_toolkit;
pub mod local_directory;
pub mod minter;
pub mod service;
pub mod session;
pub mod signer;
pub mod subject;

#[cfg(test)]
mod testing;

pub use app::SecondaryApp;
pub use bridge::{BridgeOutcome, BridgeState, ClientBridge, PrimarySession};
pub use directory::{CustomClaims, IdentityDirectory, UserRecord};
pub use error::{
    AppInitError, BridgeError, DirectoryError, ServiceError, SessionError, SignerError,
    SubjectError,
};
pub use local_directory::LocalDirectory;
pub use service::IdentityBridge;
pub use session::{ClerkSessionVerifier, SessionVerifier};
pub use signer::{ServiceAccount, TokenSigner};
pub use subject::SubjectId;
