//! Time source shared by the credential refresher and the image store.
//!
//! Both subsystems need "what time is it" and "call me back later" from the
//! same source. Services run on [`TokioClock`]; paused-time tests use
//! [`MonotonicClock`] so expiry arithmetic advances with the timers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One-shot callback scheduled through [`Clock::after`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Clock and timer source.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;

    /// Run `callback` once after `delay`, unless cancelled first.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Suspend the caller for `delay`.
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Cancellation handle for a timer scheduled with [`Clock::after`].
///
/// Cancelling is idempotent, and cancelling a timer that already fired does
/// nothing.
#[derive(Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Prevent the callback from running if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Production clock: wall time from the system, timers on the tokio runtime.
///
/// `now` always reads the system clock, so expiry instants issued by remote
/// servers are compared against real time even after the host was suspended
/// or the clock was stepped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        spawn_timer(delay, callback)
    }

    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Clock whose wall time is driven by tokio's monotonic clock.
///
/// Anchored to `Utc::now()` at construction and advanced by
/// `tokio::time::Instant`, so `tokio::time::pause` and `advance` move both
/// `now` and the timers. Drifts behind real time across host suspend; use
/// [`TokioClock`] in services.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor_mono: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor_mono: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.anchor_mono.elapsed())
            .unwrap_or_else(|_| TimeDelta::zero());
        self.anchor_wall + elapsed
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        spawn_timer(delay, callback)
    }

    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

fn spawn_timer(delay: Duration, callback: TimerCallback) -> TimerHandle {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if !cancelled.is_cancelled() {
                    callback();
                }
            }
        }
    });

    TimerHandle::new(token)
}
