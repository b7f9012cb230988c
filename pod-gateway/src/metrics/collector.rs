//! Metrics collector implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Process-wide counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    // Credential metrics
    credential_refresh_success: AtomicU64,
    credential_refresh_failure: AtomicU64,

    // Image store metrics
    images_saved: AtomicU64,
    images_deleted: AtomicU64,
    images_expired: AtomicU64,
    image_bytes_saved: AtomicU64,
    image_bytes_freed: AtomicU64,

    // Delivery callbacks
    callbacks_sent: AtomicU64,
    callbacks_failed: AtomicU64,

    // Chat proxy, keyed by status class ("2xx", "4xx", "error", ...)
    chat_requests: DashMap<String, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Credential Metrics ==========

    /// Record the outcome of one token acquisition.
    pub fn record_credential_refresh(&self, success: bool) {
        if success {
            self.credential_refresh_success
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.credential_refresh_failure
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    // ========== Image Metrics ==========

    pub fn record_image_saved(&self, bytes: u64) {
        self.images_saved.fetch_add(1, Ordering::Relaxed);
        self.image_bytes_saved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an entry leaving the store, either deleted or expired.
    pub fn record_image_removed(&self, bytes: u64, expired: bool) {
        if expired {
            self.images_expired.fetch_add(1, Ordering::Relaxed);
        } else {
            self.images_deleted.fetch_add(1, Ordering::Relaxed);
        }
        self.image_bytes_freed.fetch_add(bytes, Ordering::Relaxed);
    }

    // ========== Callback Metrics ==========

    pub fn record_callback(&self, success: bool) {
        if success {
            self.callbacks_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.callbacks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ========== Chat Proxy Metrics ==========

    /// Record a proxied chat request by upstream status, or `None` when the
    /// upstream could not be reached.
    pub fn record_chat_request(&self, status: Option<u16>) {
        let class = match status {
            Some(code) => format!("{}xx", code / 100),
            None => "error".to_string(),
        };
        self.chat_requests
            .entry(class)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let images_saved = self.images_saved.load(Ordering::Relaxed);
        let images_deleted = self.images_deleted.load(Ordering::Relaxed);
        let images_expired = self.images_expired.load(Ordering::Relaxed);
        let image_bytes_saved = self.image_bytes_saved.load(Ordering::Relaxed);
        let image_bytes_freed = self.image_bytes_freed.load(Ordering::Relaxed);

        MetricsSnapshot {
            credential_refresh_success: self.credential_refresh_success.load(Ordering::Relaxed),
            credential_refresh_failure: self.credential_refresh_failure.load(Ordering::Relaxed),
            images_saved,
            images_deleted,
            images_expired,
            images_live: images_saved.saturating_sub(images_deleted + images_expired),
            image_bytes_saved,
            image_bytes_freed,
            image_bytes_live: image_bytes_saved.saturating_sub(image_bytes_freed),
            callbacks_sent: self.callbacks_sent.load(Ordering::Relaxed),
            callbacks_failed: self.callbacks_failed.load(Ordering::Relaxed),
            chat_requests: self
                .chat_requests
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Point-in-time copy of the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub credential_refresh_success: u64,
    pub credential_refresh_failure: u64,
    pub images_saved: u64,
    pub images_deleted: u64,
    pub images_expired: u64,
    pub images_live: u64,
    pub image_bytes_saved: u64,
    pub image_bytes_freed: u64,
    pub image_bytes_live: u64,
    pub callbacks_sent: u64,
    pub callbacks_failed: u64,
    pub chat_requests: HashMap<String, u64>,
}
