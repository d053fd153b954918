// File: testing-framework/src/orchestrator/clock.rs
//
// Clock Abstraction
//
// The emulator stamps every recorded call and realizes every scripted delay
// through this trait, so suites running on tokio's paused clock replay
// multi-second scripts instantly and with exact timestamps.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Time source injected into the scripted server
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use streamkv_testing_framework::orchestrator::clock::{Clock, SystemClock};
///
/// #[tokio::main]
/// async fn main() {
///     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
///     let start = clock.now();
///     clock.sleep(Duration::from_millis(10)).await;
///     assert!(clock.elapsed_since(start) >= Duration::from_millis(10));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Current instant, simulated when tokio time is paused
    fn now(&self) -> Instant;

    /// Wait for `d`; resolves as soon as paused time reaches the deadline
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Time since `earlier`, saturating at zero
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Tokio's clock, real or paused depending on the runtime
///
/// Suites annotated with `#[tokio::test(start_paused = true)]` use this one:
/// the runtime auto-advances paused time whenever every task is idle.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Clock that pauses tokio time on construction and advances on demand
///
/// `new()` calls `time::pause()`, which panics if time is already paused;
/// pair it with a plain `#[tokio::test]`.
pub struct PausedClock;

impl PausedClock {
    /// Pause tokio time and return the clock
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Move paused time forward, waking every sleep that expires on the way
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}
