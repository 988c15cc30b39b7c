use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared, write-once stop request.
///
/// `Player::stop` raises it from the caller's thread; the playback loop reads it once per tick
/// and the pacer reads it once per sleep slice. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_raised());

        signal.raise();
        signal.raise();
        assert!(observer.is_raised());
    }

    #[test]
    fn visible_across_threads() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || remote.raise())
            .join()
            .expect("raise thread panicked");
        assert!(signal.is_raised());
    }
}
