//! Real-time governor for compressed-sample submission.
//!
//! The playback loop must not pull the next compressed chunk before the wall clock has caught
//! up with that chunk's presentation time. The pacer enforces this by polling: sleep one short
//! slice, re-read the clock, re-check the stop signal, repeat. Re-reading the clock every slice
//! means oversleeping in one slice does not accumulate into drift.
//!
//! Known approximation: pacing follows the *input* sample time, not the decoder's output
//! presentation time, so decode latency is not compensated for.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::stop::StopSignal;

/// Result of a pacing wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// Wall-clock time reached the sample time; the next chunk may be pulled.
    Ready,
    /// The stop signal was raised while waiting.
    Stopped,
}

pub struct Pacer {
    clock: Arc<dyn Clock>,
    slice: Duration,
    /// Timestamp of the first paced sample; later samples are measured relative to it.
    origin_us: Option<i64>,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, slice: Duration) -> Self {
        Self {
            clock,
            slice,
            origin_us: None,
        }
    }

    /// Current reading of the pacer's clock. The loop records this as the session start.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Pin the stream origin to the first sample's timestamp.
    pub fn anchor(&mut self, first_sample_time_us: i64) {
        self.origin_us = Some(first_sample_time_us);
    }

    /// Block until `session_start + (sample_time_us - first_sample_time_us)` has passed.
    ///
    /// Microseconds are converted to whole milliseconds by integer division before comparing,
    /// so the governor never waits for a fraction of a millisecond. The first call only records
    /// the stream origin and returns immediately.
    pub fn throttle_before_advance(
        &mut self,
        sample_time_us: i64,
        session_start: Duration,
        stop: &StopSignal,
    ) -> PaceOutcome {
        let origin = *self.origin_us.get_or_insert(sample_time_us);
        let due_ms = u64::try_from((sample_time_us - origin) / 1000).unwrap_or(0);

        loop {
            if stop.is_raised() {
                return PaceOutcome::Stopped;
            }

            let elapsed_ms = self.clock.now().saturating_sub(session_start).as_millis() as u64;
            if elapsed_ms >= due_ms {
                return PaceOutcome::Ready;
            }

            self.clock.sleep(self.slice);
        }
    }
}
