//! Credential lifecycle manager.
//!
//! Acquires the first token at construction, then keeps it fresh from a
//! single background task. Readers only ever touch the cache.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::cache::CredentialCache;
use super::error::CredentialError;
use super::source::TokenSource;
use super::types::{Credential, CredentialStatus, RefreshSettings};
use crate::clock::Clock;
use crate::metrics::MetricsCollector;

/// Owns the cached credential and the task that renews it.
pub struct CredentialManager {
    cache: CredentialCache,
    source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
    metrics: Arc<MetricsCollector>,
    last_refresh: RwLock<DateTime<Utc>>,
    consecutive_failures: AtomicU32,
    cancel_token: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl CredentialManager {
    /// Acquire the first credential and start the refresh loop.
    ///
    /// A failed first acquisition is returned as
    /// [`CredentialError::Initialization`] and is not retried; the caller
    /// decides whether startup should abort.
    #[instrument(skip_all)]
    pub async fn initialize(
        source: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
        settings: RefreshSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<Self>, CredentialError> {
        let initial = acquire_checked(source.as_ref())
            .await
            .map_err(CredentialError::initialization)?;

        info!(expires_at = %initial.expires_at(), "Initial credential acquired");
        metrics.record_credential_refresh(true);

        let manager = Arc::new(Self {
            cache: CredentialCache::new(initial),
            source,
            last_refresh: RwLock::new(clock.now()),
            clock,
            settings,
            metrics,
            consecutive_failures: AtomicU32::new(0),
            cancel_token: CancellationToken::new(),
            refresh_task: Mutex::new(None),
        });

        let task = tokio::spawn(run_refresh_loop(
            Arc::downgrade(&manager),
            manager.cancel_token.clone(),
            manager.clock.clone(),
        ));
        *manager.refresh_task.lock() = Some(task);

        Ok(manager)
    }

    /// Current credential. Never blocks on the network and never refreshes.
    pub fn read(&self) -> Credential {
        self.cache.read()
    }

    /// `Authorization` header value for the current credential.
    pub fn authorization_header(&self) -> String {
        self.cache.read().bearer()
    }

    /// Acquire a new credential and swap it into the cache.
    ///
    /// On failure the cached credential is left untouched.
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        match acquire_checked(self.source.as_ref()).await {
            Ok(credential) => {
                let expires_at = credential.expires_at();
                self.cache.replace(credential);
                *self.last_refresh.write() = self.clock.now();
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.metrics.record_credential_refresh(true);
                info!(%expires_at, "Credential refreshed");
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_credential_refresh(false);
                Err(CredentialError::refresh(e))
            }
        }
    }

    /// Stop the refresh loop. Safe to call any number of times.
    pub fn shutdown(&self) {
        if !self.cancel_token.is_cancelled() {
            debug!("Stopping credential refresh loop");
        }
        self.cancel_token.cancel();
    }

    /// Stop the refresh loop and wait for the task to finish.
    pub async fn close(&self) {
        self.shutdown();
        let task = self.refresh_task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Credential refresh task ended abnormally");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Health snapshot. Does not expose the token.
    pub fn status(&self) -> CredentialStatus {
        let credential = self.cache.read();
        let now = self.clock.now();
        CredentialStatus {
            expires_at: credential.expires_at(),
            valid: credential.is_valid_at(now),
            expires_in_secs: credential.remaining(now).as_secs(),
            last_refresh: *self.last_refresh.read(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Wait before the next scheduled refresh.
    fn next_refresh_delay(&self) -> Duration {
        let remaining = self.cache.read().remaining(self.clock.now());
        remaining
            .saturating_sub(self.settings.refresh_leeway)
            .max(self.settings.min_delay)
    }

    /// One scheduled cycle: refresh, and on failure retry exactly once.
    async fn refresh_cycle(&self, cancel_token: &CancellationToken) -> ControlFlow<()> {
        let Err(e) = self.refresh().await else {
            return ControlFlow::Continue(());
        };

        warn!(
            error = %e,
            retry_in_secs = self.settings.retry_backoff.as_secs(),
            "Scheduled credential refresh failed; retrying once"
        );

        tokio::select! {
            _ = cancel_token.cancelled() => return ControlFlow::Break(()),
            _ = self.clock.sleep(self.settings.retry_backoff) => {}
        }

        if let Err(e) = self.refresh().await {
            let current = self.cache.read();
            error!(
                error = %e,
                expires_at = %current.expires_at(),
                "Credential refresh retry failed; serving cached token until next cycle"
            );
        }

        ControlFlow::Continue(())
    }
}

impl Drop for CredentialManager {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn acquire_checked(source: &dyn TokenSource) -> Result<Credential, CredentialError> {
    let credential = source.acquire(Uuid::new_v4()).await?;
    if credential.token().is_empty() {
        return Err(CredentialError::MalformedResponse(
            "token endpoint returned an empty token".to_string(),
        ));
    }
    Ok(credential)
}

/// Background loop. Holds only a weak reference while idle so dropping the
/// last manager handle also ends the task.
async fn run_refresh_loop(
    weak: Weak<CredentialManager>,
    cancel_token: CancellationToken,
    clock: Arc<dyn Clock>,
) {
    loop {
        let Some(delay) = weak.upgrade().map(|m| m.next_refresh_delay()) else {
            return;
        };
        debug!(delay_secs = delay.as_secs(), "Next credential refresh scheduled");

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = clock.sleep(delay) => {}
        }

        let Some(manager) = weak.upgrade() else {
            return;
        };

        let flow = tokio::select! {
            _ = cancel_token.cancelled() => ControlFlow::Break(()),
            flow = manager.refresh_cycle(&cancel_token) => flow,
        };
        if flow.is_break() {
            break;
        }
    }

    debug!("Credential refresh loop stopped");
}
