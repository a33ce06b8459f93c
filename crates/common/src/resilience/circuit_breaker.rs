//! Circuit breaker gating every upstream attempt
//!
//! States: `CLOSED` (initial) → `OPEN` → `HALF_OPEN` → `CLOSED` | `OPEN`.
//!
//! The breaker never retries anything itself. It only counts outcomes
//! reported through [`CircuitBreaker::record_failure`] and
//! [`CircuitBreaker::record_success`], and rejects calls from
//! [`CircuitBreaker::check_state`] while open.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{CategorizedError, ErrorContext};
use crate::time::{SharedClock, SystemClock};

/// Consecutive failures that open a closed circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Cooldown before an open circuit admits a probe
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Half-open successes required to close the circuit
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;

/// Invalid breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow; failures are counted
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// Probe calls are admitted to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Thresholds and cooldown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures while closed before opening
    pub failure_threshold: u32,
    /// Cooldown between opening and admitting a probe
    pub open_timeout: Duration,
    /// Successes while half-open before closing
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "success_threshold must be greater than 0".to_string(),
            });
        }

        if self.open_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "open_timeout must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time snapshot of the breaker; timestamps are unix milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<u64>,
    pub last_state_change: Option<u64>,
    pub next_attempt_time: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_ms: Option<u64>,
    last_state_change_ms: Option<u64>,
    next_attempt_ms: Option<u64>,
}

impl BreakerState {
    const INITIAL: Self = Self {
        state: CircuitState::Closed,
        failure_count: 0,
        success_count: 0,
        last_failure_ms: None,
        last_state_change_ms: None,
        next_attempt_ms: None,
    };

    fn transition(&mut self, to: CircuitState, now_ms: u64) {
        self.state = to;
        self.last_state_change_ms = Some(now_ms);
    }

    fn open(&mut self, now_ms: u64, cooldown: Duration) {
        self.transition(CircuitState::Open, now_ms);
        self.next_attempt_ms = Some(now_ms.saturating_add(cooldown.as_millis() as u64));
        self.success_count = 0;
    }
}

/// Tri-state breaker shared by every call made through one client
///
/// All state lives in one owned value behind a mutex, so concurrent callers
/// observe each transition atomically.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: SharedClock,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = *self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("success_count", &inner.success_count)
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_clock(CircuitBreakerConfig::default(), SystemClock::shared())
    }
}

impl CircuitBreaker {
    /// Breaker on the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::with_clock(config, SystemClock::shared()))
    }

    /// Breaker reading time from `clock`; `config` must already be valid
    pub fn with_clock(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self { config, inner: Mutex::new(BreakerState::INITIAL), clock }
    }

    /// Active configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Gate a call
    ///
    /// While open and cooling down, fails with `SERVICE_UNAVAILABLE` carrying
    /// the remaining wait. Once the cooldown has elapsed, moves to half-open
    /// and admits the call as a probe. Closed and half-open circuits admit
    /// calls unchanged.
    pub fn check_state(&self, context: Option<&ErrorContext>) -> Result<(), CategorizedError> {
        let now_ms = self.clock.millis_since_epoch();
        let mut inner = self.inner.lock();

        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let next_attempt_ms = inner.next_attempt_ms.unwrap_or(now_ms);
        if now_ms < next_attempt_ms {
            let retry_in = Duration::from_millis(next_attempt_ms - now_ms);
            debug!(
                retry_in_ms = retry_in.as_millis() as u64,
                operation = context.map(|c| c.operation.as_str()),
                "Circuit breaker rejecting call"
            );
            return Err(
                CategorizedError::service_unavailable(retry_in).with_context(context.cloned())
            );
        }

        inner.transition(CircuitState::HalfOpen, now_ms);
        info!(failure_count = inner.failure_count, "Circuit breaker half-open, admitting probe");
        Ok(())
    }

    /// Count a failed call
    pub fn record_failure(&self) {
        let now_ms = self.clock.millis_since_epoch();
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_ms = Some(now_ms);

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.open(now_ms, self.config.open_timeout);
                warn!(failure_count = inner.failure_count, "Circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                inner.open(now_ms, self.config.open_timeout);
                warn!(
                    failure_count = inner.failure_count,
                    "Circuit breaker reopened by failed probe"
                );
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Count a successful call
    pub fn record_success(&self) {
        let now_ms = self.clock.millis_since_epoch();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count = inner.success_count.saturating_add(1);
                if inner.success_count >= self.config.success_threshold {
                    inner.transition(CircuitState::Closed, now_ms);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.next_attempt_ms = None;
                    info!("Circuit breaker closed after successful probes");
                }
            }
            // A call admitted before the circuit opened may still finish
            CircuitState::Open => debug!("Ignoring success reported while circuit is open"),
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and timestamps
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = *self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_ms,
            last_state_change: inner.last_state_change_ms,
            next_attempt_time: inner.next_attempt_ms,
        }
    }

    /// Force back to the initial closed state
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::INITIAL;
        info!("Circuit breaker manually reset to closed state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::time::MockClock;

    const START_MS: u64 = 1_700_000_000_000;

    fn breaker() -> (CircuitBreaker, MockClock) {
        let clock = MockClock::at_unix_secs(START_MS / 1_000);
        (CircuitBreaker::with_clock(CircuitBreakerConfig::default(), clock.shared()), clock)
    }

    fn open(breaker: &CircuitBreaker) {
        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            breaker.record_failure();
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().success_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().open_timeout(Duration::ZERO).build().is_err());

        let config = CircuitBreakerConfig::builder().failure_threshold(2).build().unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.open_timeout, DEFAULT_OPEN_TIMEOUT);
    }

    #[test]
    fn test_fifth_failure_opens() {
        let (breaker, _clock) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        breaker.record_failure();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.failure_count, 5);
        assert_eq!(stats.next_attempt_time, Some(START_MS + 30_000));
        assert_eq!(stats.last_failure_time, Some(START_MS));
    }

    #[test]
    fn test_success_while_closed_resets_failures() {
        let (breaker, _clock) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        assert_eq!(breaker.stats().failure_count, 0);
        assert_eq!(breaker.stats().success_count, 0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_with_countdown() {
        let (breaker, clock) = breaker();
        open(&breaker);
        clock.advance_millis(10_000);

        let ctx = ErrorContext::new("issues.create");
        let err = breaker.check_state(Some(&ctx)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ServiceUnavailable);
        assert_eq!(err.retry_decision.delay_ms(), 20_000);
        assert!(!err.retry_decision.should_retry);
        assert!(err.user_message.contains("20 seconds"));
        assert_eq!(err.context, Some(ctx));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_cooldown_elapsed_admits_probe() {
        let (breaker, clock) = breaker();
        open(&breaker);
        clock.advance_millis(30_000);

        assert!(breaker.check_state(None).is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Further checks in half-open leave the state alone
        assert!(breaker.check_state(None).is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_three_probe_successes_close() {
        let (breaker, clock) = breaker();
        open(&breaker);
        clock.advance_millis(30_001);
        breaker.check_state(None).unwrap();

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().success_count, 2);

        breaker.record_success();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.next_attempt_time, None);
    }

    #[test]
    fn test_probe_failure_reopens_immediately() {
        let (breaker, clock) = breaker();
        open(&breaker);
        clock.advance_millis(30_000);
        breaker.check_state(None).unwrap();
        breaker.record_success();
        breaker.record_success();

        breaker.record_failure();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.failure_count, 6);
        assert_eq!(stats.next_attempt_time, Some(START_MS + 60_000));
    }

    #[test]
    fn test_reset_from_any_state() {
        let (breaker, clock) = breaker();
        open(&breaker);
        clock.advance_millis(30_000);
        breaker.check_state(None).unwrap();
        breaker.record_success();

        breaker.reset();
        assert_eq!(
            breaker.stats(),
            CircuitBreakerStats {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                last_state_change: None,
                next_attempt_time: None,
            }
        );
    }

    #[test]
    fn test_stats_serialize_with_state_token() {
        let (breaker, _clock) = breaker();
        let json = serde_json::to_value(breaker.stats()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert!(json["next_attempt_time"].is_null());
    }
}
