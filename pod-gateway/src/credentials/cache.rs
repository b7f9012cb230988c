//! Single-slot credential cache.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::types::Credential;

/// Holds the current credential.
///
/// Token and expiry live behind one lock, so a reader sees either the old
/// pair or the new pair, never a mix of both.
#[derive(Debug)]
pub struct CredentialCache {
    slot: RwLock<Credential>,
}

impl CredentialCache {
    pub fn new(initial: Credential) -> Self {
        Self {
            slot: RwLock::new(initial),
        }
    }

    /// Most recently cached credential. Never blocks on I/O.
    pub fn read(&self) -> Credential {
        self.slot.read().clone()
    }

    /// Swap in a new credential. The previous token is discarded.
    pub fn replace(&self, credential: Credential) {
        *self.slot.write() = credential;
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.slot.read().expires_at()
    }
}
