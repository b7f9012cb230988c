//! Token acquisition seam.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::CredentialError;
use super::types::Credential;

/// Acquires a fresh credential from the protected backend.
///
/// Implementations hold the static long-lived authentication material and
/// the requested scope; the caller supplies a per-call request id.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Exchange static credentials for a new bearer token.
    ///
    /// # Arguments
    /// * `rq_uid` - Request-scoped nonce, unique per call
    async fn acquire(&self, rq_uid: Uuid) -> Result<Credential, CredentialError>;
}
