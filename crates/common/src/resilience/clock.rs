//! Time abstraction shared by the circuit breaker and the cache
//!
//! Breakers measure reset timeouts and caches measure entry lifetimes against
//! a [`Clock`]. Production code uses [`SystemClock`]; tests drive a
//! [`MockClock`] forward explicitly so timeout behaviour can be asserted
//! without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic instant used for elapsed-time arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time used for persisted timestamps.
    fn system_time(&self) -> SystemTime;

    /// Milliseconds since the UNIX epoch according to [`Clock::system_time`].
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same elapsed offset, so a clock handed to a breaker or a
/// cache store can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    epoch_offset: Duration,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock whose wall time starts at the UNIX epoch.
    pub fn new() -> Self {
        Self::with_epoch_millis(0)
    }

    /// Create a mock clock whose wall time starts `millis` after the epoch.
    pub fn with_epoch_millis(millis: u64) -> Self {
        Self {
            start: Instant::now(),
            epoch_offset: Duration::from_millis(millis),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Move time forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Total time advanced so far.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.epoch_offset + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates that the system clock is monotonic.
    #[test]
    fn test_system_clock_now() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();
        assert!(now2 >= now1, "System clock should advance");
    }

    /// Validates `MockClock::advance` moves both monotonic and wall time.
    ///
    /// Assertions:
    /// - Confirms `after.duration_since(start)` equals 5 seconds.
    /// - Confirms `millis_since_epoch()` equals 5000.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
        assert_eq!(clock.millis_since_epoch(), 5000);
    }

    /// Validates that clones share the elapsed offset.
    #[test]
    fn test_mock_clock_clone_shares_time() {
        let clock1 = MockClock::with_epoch_millis(1_000);
        let clock2 = clock1.clone();

        clock2.advance_millis(250);

        assert_eq!(clock1.elapsed(), Duration::from_millis(250));
        assert_eq!(clock1.millis_since_epoch(), 1_250);
    }
}
