//! Injectable monotonic time source.
//!
//! The pacer compares stream time against elapsed wall-clock time. Going through a trait keeps
//! that comparison deterministic in tests (see [`ManualClock`]) while production code uses the
//! real monotonic clock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic clock with a matching sleep primitive.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Block the calling thread for roughly `dur`.
    fn sleep(&self, dur: Duration);
}

/// Clock backed by `std::time::Instant` and `std::thread::sleep`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// Clock that only moves when slept on or advanced explicitly.
///
/// Every `sleep` call is recorded so tests can assert on the pacer's slicing.
#[derive(Debug, Default)]
pub struct ManualClock {
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dur: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += dur;
        }
    }

    /// Sleeps requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|state| state.sleeps.clone())
            .unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.lock().map(|state| state.now).unwrap_or_default()
    }

    fn sleep(&self, dur: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += dur;
            state.sleeps.push(dur);
        }
    }
}
