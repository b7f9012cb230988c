//! Credential lifecycle management.
//!
//! Keeps a short-lived bearer token for an OAuth-protected backend cached
//! and fresh, so request handlers can attach it without a network round
//! trip.
//!
//! # Architecture
//!
//! - [`TokenSource`]: acquires a new credential from the backend
//! - [`OAuthTokenSource`]: `TokenSource` for GigaChat-style `/oauth` endpoints
//! - [`CredentialCache`]: the single credential slot, replaced atomically
//! - [`CredentialManager`]: owns the cache and the background refresh loop

mod cache;
mod error;
mod manager;
mod oauth;
mod source;
mod types;

pub use cache::CredentialCache;
pub use error::CredentialError;
pub use manager::CredentialManager;
pub use oauth::{DEFAULT_SCOPE, OAuthSettings, OAuthTokenSource};
pub use source::TokenSource;
pub use types::{Credential, CredentialStatus, RefreshSettings};
