//! Error categories, per-kind retry policy and user-facing wording.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::serde::duration_millis;

/// Maximum retries for server and network failures.
pub const TRANSIENT_MAX_RETRIES: u32 = 3;

/// Base interval for exponential backoff.
pub const BACKOFF_BASE: Duration = Duration::from_millis(1_000);

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Upstream quota exhausted (429 or GraphQL `RATE_LIMITED`)
    RateLimit,
    /// Credential rejected or lacking permissions (401/403)
    Auth,
    /// Upstream 5xx
    Server,
    /// Connection-level fault or timeout
    Network,
    /// Request rejected as malformed (400/422)
    Validation,
    /// Anything the table does not recognise
    Unknown,
    /// Circuit breaker is open
    ServiceUnavailable,
}

impl ErrorCategory {
    /// Every category, in declaration order
    pub const ALL: [Self; 7] = [
        Self::RateLimit,
        Self::Auth,
        Self::Server,
        Self::Network,
        Self::Validation,
        Self::Unknown,
        Self::ServiceUnavailable,
    ];

    /// Wire name of the category
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::Auth => "AUTH",
            Self::Server => "SERVER",
            Self::Network => "NETWORK",
            Self::Validation => "VALIDATION",
            Self::Unknown => "UNKNOWN",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy computed for one failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDecision {
    /// Whether the category allows another attempt at all
    pub should_retry: bool,
    /// Delay to wait before the next attempt
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
    /// Category cap on retries
    pub max_retries: u32,
    /// Zero-based attempt number this decision was computed for
    pub attempt: u32,
}

impl RetryDecision {
    /// Decision that never retries
    pub const fn stop(attempt: u32) -> Self {
        Self { should_retry: false, delay: Duration::ZERO, max_retries: 0, attempt }
    }

    /// Delay in whole milliseconds
    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }

    /// `should_retry && attempt < max_retries`
    pub const fn allows_another_attempt(&self) -> bool {
        self.should_retry && self.attempt < self.max_retries
    }
}

/// Category-specific failure data
///
/// One variant per [`ErrorCategory`]. The variant owns the policy: call
/// [`FailureKind::retry_decision`] and [`FailureKind::user_message`] instead
/// of branching on the category elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Rate limited until `reset_at_secs` (unix seconds)
    RateLimit {
        /// Unix second at which the upstream window resets
        reset_at_secs: u64,
    },
    /// 401 (`forbidden == false`) or 403 (`forbidden == true`)
    Auth {
        /// Whether the credential was valid but lacked permission
        forbidden: bool,
    },
    /// 5xx response
    Server,
    /// Connection fault or timeout
    Network,
    /// 400/422 response
    Validation,
    /// Unrecognised failure
    Unknown,
    /// Breaker open; calls resume after `retry_in`
    ServiceUnavailable {
        /// Remaining cooldown
        #[serde(rename = "retry_in_ms", with = "duration_millis")]
        retry_in: Duration,
    },
}

impl FailureKind {
    /// Category of this kind
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimit { .. } => ErrorCategory::RateLimit,
            Self::Auth { .. } => ErrorCategory::Auth,
            Self::Server => ErrorCategory::Server,
            Self::Network => ErrorCategory::Network,
            Self::Validation => ErrorCategory::Validation,
            Self::Unknown => ErrorCategory::Unknown,
            Self::ServiceUnavailable { .. } => ErrorCategory::ServiceUnavailable,
        }
    }

    /// Compute the retry decision for a failure of this kind
    ///
    /// `now_ms` is the current wall time in unix milliseconds; only the
    /// rate-limit variant reads it.
    pub fn retry_decision(&self, attempt: u32, now_ms: u64) -> RetryDecision {
        match self {
            Self::RateLimit { reset_at_secs } => RetryDecision {
                should_retry: true,
                delay: Duration::from_millis(
                    reset_at_secs.saturating_mul(1_000).saturating_sub(now_ms),
                ),
                max_retries: 1,
                attempt,
            },
            Self::Auth { .. } | Self::Validation => RetryDecision::stop(attempt),
            Self::Server | Self::Network => RetryDecision {
                should_retry: attempt < TRANSIENT_MAX_RETRIES,
                delay: exponential_backoff(attempt),
                max_retries: TRANSIENT_MAX_RETRIES,
                attempt,
            },
            Self::Unknown => RetryDecision {
                should_retry: true,
                delay: BACKOFF_BASE,
                max_retries: 1,
                attempt,
            },
            Self::ServiceUnavailable { retry_in } => RetryDecision {
                should_retry: false,
                delay: *retry_in,
                max_retries: 0,
                attempt,
            },
        }
    }

    /// Actionable sentence for display to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimit { reset_at_secs } => {
                let reset = i64::try_from(*reset_at_secs)
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
                match reset {
                    Some(at) => format!(
                        "API rate limit exceeded. Please wait until {} UTC and retry.",
                        at.format("%H:%M:%S")
                    ),
                    None => "API rate limit exceeded. Please wait a minute and retry.".to_string(),
                }
            }
            Self::Auth { forbidden: false } => "Authentication failed. Please check that your \
                 access token is valid and has not expired or been revoked."
                .to_string(),
            Self::Auth { forbidden: true } => "Authorization failed: the token lacks the \
                 permissions for this operation. Please re-verify the token scopes and \
                 repository access."
                .to_string(),
            Self::Server => "The upstream service returned a server error. Please try again \
                 in a few moments."
                .to_string(),
            Self::Network => "Could not reach the upstream service. Please check your network \
                 connection and try again."
                .to_string(),
            Self::Validation => "The request was rejected as invalid. Please check the request \
                 parameters and try again."
                .to_string(),
            Self::Unknown => "An unexpected error occurred. Please try again, and check the \
                 logs if the problem persists."
                .to_string(),
            Self::ServiceUnavailable { retry_in } => format!(
                "The upstream service is temporarily unavailable after repeated failures. \
                 Please try again in {} seconds.",
                ceil_secs(*retry_in)
            ),
        }
    }
}

/// `2^attempt * 1000ms`, saturating for absurd attempt counts
pub fn exponential_backoff(attempt: u32) -> Duration {
    let multiplier = 1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX);
    BACKOFF_BASE.saturating_mul(multiplier)
}

pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    millis.div_ceil(1_000)
}
