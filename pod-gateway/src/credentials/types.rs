//! Credential value types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default margin before expiry at which the token is renewed.
pub const DEFAULT_REFRESH_LEEWAY: Duration = Duration::from_secs(10);

/// Default pause before the single retry of a failed refresh.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Lower bound on the wait between two refresh cycles.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(1);

/// A bearer token together with the instant it stops being valid.
///
/// The pair is always replaced as a unit.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check if the token is still accepted at `now`.
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left until expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tuning for the background refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Renew this long before `expires_at`.
    pub refresh_leeway: Duration,
    /// Wait this long before retrying a failed refresh (exactly once).
    pub retry_backoff: Duration,
    /// Never schedule the next cycle sooner than this.
    pub min_delay: Duration,
}

impl RefreshSettings {
    pub fn with_leeway(refresh_leeway: Duration) -> Self {
        Self {
            refresh_leeway,
            ..Self::default()
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_leeway: DEFAULT_REFRESH_LEEWAY,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            min_delay: MIN_REFRESH_DELAY,
        }
    }
}

/// Snapshot of the manager's state for health reporting.
///
/// Never carries the token itself.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub expires_at: DateTime<Utc>,
    pub valid: bool,
    pub expires_in_secs: u64,
    pub last_refresh: DateTime<Utc>,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let credential = Credential::new("abc", now + TimeDelta::seconds(30));

        assert!(credential.is_valid_at(now));
        assert!(!credential.is_valid_at(now + TimeDelta::seconds(30)));
        assert_eq!(credential.remaining(now), Duration::from_secs(30));
        assert_eq!(
            credential.remaining(now + TimeDelta::seconds(45)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("super-secret", Utc::now());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_bearer_header() {
        let credential = Credential::new("tok", Utc::now());
        assert_eq!(credential.bearer(), "Bearer tok");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RefreshSettings::default();
        assert_eq!(settings.refresh_leeway, Duration::from_secs(10));
        assert_eq!(settings.retry_backoff, Duration::from_secs(5));
        assert_eq!(settings.min_delay, Duration::from_secs(1));

        let custom = RefreshSettings::with_leeway(Duration::from_secs(60));
        assert_eq!(custom.refresh_leeway, Duration::from_secs(60));
        assert_eq!(custom.retry_backoff, DEFAULT_RETRY_BACKOFF);
    }
}
