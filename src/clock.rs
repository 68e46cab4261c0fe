use std::time::Instant;

/// Time source for the client tracker.
/// Swappable so window expiry can be driven by hand in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

// Monotonic wall clock, the default everywhere outside tests
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
