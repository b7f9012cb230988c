//! In-memory image store with per-entry expiry.

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use futures::stream;
use tracing::{debug, info};

use super::id::ImageId;
use super::sniff::{ImageKind, sniff_image};
use crate::clock::{Clock, TimerHandle};
use crate::metrics::MetricsCollector;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("image payload is empty")]
    EmptyPayload,
}

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    Deleted,
    Expired,
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalCause::Deleted => write!(f, "deleted"),
            RemovalCause::Expired => write!(f, "expired"),
        }
    }
}

struct Entry {
    data: Bytes,
    timer: Option<TimerHandle>,
}

struct StoreInner {
    entries: DashMap<ImageId, Entry>,
    metrics: Arc<MetricsCollector>,
}

impl StoreInner {
    /// The single removal path shared by explicit deletes and TTL timers.
    /// Returns false when the entry was already gone.
    fn remove(&self, id: &ImageId, cause: RemovalCause) -> bool {
        let Some((_, entry)) = self.entries.remove(id) else {
            debug!(%id, %cause, "Image already removed");
            return false;
        };

        if let Some(timer) = entry.timer {
            timer.cancel();
        }

        let bytes = entry.data.len();
        self.metrics
            .record_image_removed(bytes as u64, cause == RemovalCause::Expired);
        info!(%id, bytes, %cause, "Image memory freed");
        true
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            if let Some(timer) = &entry.timer {
                timer.cancel();
            }
        }
    }
}

/// Concurrent map from [`ImageId`] to image bytes.
///
/// Cloning is cheap and every clone sees the same entries. TTL timers only
/// hold a weak reference, so dropping the last clone releases all memory and
/// cancels pending timers.
#[derive(Clone)]
pub struct EphemeralStore {
    inner: Arc<StoreInner>,
    clock: Arc<dyn Clock>,
}

impl EphemeralStore {
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                metrics,
            }),
            clock,
        }
    }

    /// Store a private copy of `payload`.
    ///
    /// A non-zero `ttl` schedules removal once it elapses; `Duration::ZERO`
    /// keeps the entry until it is deleted.
    pub fn save(&self, payload: &[u8], ttl: Duration) -> Result<ImageId, StoreError> {
        if payload.is_empty() {
            return Err(StoreError::EmptyPayload);
        }

        let id = ImageId::generate();
        let data = Bytes::copy_from_slice(payload);
        let bytes = data.len();

        self.inner.entries.insert(id, Entry { data, timer: None });
        self.inner.metrics.record_image_saved(bytes as u64);
        info!(%id, bytes, ttl_secs = ttl.as_secs(), "Image saved");

        if !ttl.is_zero() {
            let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
            let timer = self.clock.after(
                ttl,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.remove(&id, RemovalCause::Expired);
                    }
                }),
            );

            // The entry may already be gone if it was deleted in between.
            match self.inner.entries.get_mut(&id) {
                Some(mut entry) => entry.timer = Some(timer),
                None => timer.cancel(),
            }
        }

        Ok(id)
    }

    /// Current bytes for `id`. Never deletes and never touches the TTL.
    pub fn get(&self, id: &ImageId) -> Option<Bytes> {
        self.inner.entries.get(id).map(|entry| entry.data.clone())
    }

    /// Remove `id` and cancel its timer. Absent ids are ignored.
    pub fn delete(&self, id: &ImageId) {
        self.inner.remove(id, RemovalCause::Deleted);
    }

    /// Read the entry with the intent to remove it once fully delivered.
    pub fn checkout(&self, id: &ImageId) -> Option<Checkout> {
        let data = self.get(id)?;
        Some(Checkout {
            id: *id,
            data,
            store: self.clone(),
            delivered: false,
            on_complete: None,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Total payload bytes currently held.
    pub fn stored_bytes(&self) -> usize {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.data.len())
            .sum()
    }
}

impl fmt::Debug for EphemeralStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralStore")
            .field("entries", &self.len())
            .finish()
    }
}

type CompletionHook = Box<dyn FnOnce(ImageId) + Send + 'static>;

/// Read-once handle returned by [`EphemeralStore::checkout`].
///
/// Dropping a checkout that was marked delivered deletes the entry and runs
/// the completion hook. A checkout dropped before delivery leaves the entry
/// in place for its TTL.
pub struct Checkout {
    id: ImageId,
    data: Bytes,
    store: EphemeralStore,
    delivered: bool,
    on_complete: Option<CompletionHook>,
}

impl Checkout {
    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn kind(&self) -> Option<ImageKind> {
        sniff_image(&self.data)
    }

    /// Run `hook` after the entry has been reclaimed.
    pub fn on_complete(mut self, hook: impl FnOnce(ImageId) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    /// Body stream that yields the bytes once and marks the checkout
    /// delivered when the consumer polls past the end.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        enum Stage {
            Pending(Checkout),
            Sent(Checkout),
        }

        stream::unfold(Stage::Pending(self), |stage| async move {
            match stage {
                Stage::Pending(checkout) => {
                    let chunk = checkout.data.clone();
                    Some((Ok::<_, Infallible>(chunk), Stage::Sent(checkout)))
                }
                Stage::Sent(mut checkout) => {
                    checkout.mark_delivered();
                    None
                }
            }
        })
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if !self.delivered {
            debug!(id = %self.id, "Checkout dropped before delivery, leaving entry to expire");
            return;
        }
        self.store.delete(&self.id);
        if let Some(hook) = self.on_complete.take() {
            hook(self.id);
        }
    }
}

impl fmt::Debug for Checkout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("id", &self.id)
            .field("bytes", &self.data.len())
            .field("delivered", &self.delivered)
            .finish()
    }
}
