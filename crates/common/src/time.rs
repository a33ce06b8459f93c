//! Time abstraction for testability
//!
//! The breaker, the categorizer and the retry orchestrator all read "now"
//! through [`Clock`] so that cooldowns and rate-limit windows can be tested
//! without waiting on the wall clock.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use relaygate_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::at_unix_secs(1_700_000_000);
//! let before = clock.millis_since_epoch();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.millis_since_epoch() - before, 5_000);
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Trait for time operations to enable deterministic testing
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    /// Get whole seconds since UNIX epoch
    fn secs_since_epoch(&self) -> u64 {
        self.millis_since_epoch() / 1_000
    }
}

/// Clock handle shared between the breaker, categorizer and orchestrator.
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

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

/// Mock clock for deterministic testing
///
/// Wall-clock time starts at `epoch_offset` after the UNIX epoch and only
/// moves when [`MockClock::advance`] or [`MockClock::set_elapsed`] is called.
/// Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    epoch_offset: Duration,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock whose wall time starts at the UNIX epoch
    pub fn new() -> Self {
        Self::with_epoch_offset(Duration::ZERO)
    }

    /// Create a mock clock whose wall time starts at the given unix second
    ///
    /// Rate-limit reset headers are absolute unix seconds, so tests that
    /// exercise them want a realistic starting point.
    pub fn at_unix_secs(secs: u64) -> Self {
        Self::with_epoch_offset(Duration::from_secs(secs))
    }

    fn with_epoch_offset(epoch_offset: Duration) -> Self {
        Self { start: Instant::now(), epoch_offset, elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed = duration;
        }
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }

    /// Shared handle to this clock (clones keep the same timeline)
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
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
