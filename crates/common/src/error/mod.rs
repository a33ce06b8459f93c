//! Error taxonomy shared by the categorizer, the breaker and the retry loop
//!
//! Every failed upstream attempt is turned into a [`CategorizedError`]: one
//! of seven [`ErrorCategory`] values, a technical message for logs, a
//! user-facing remediation sentence and the [`RetryDecision`] that the retry
//! loop follows.
//!
//! # Structure
//!
//! 1. **[`FailureKind`]**: a closed sum type with one variant per category.
//!    Each variant computes its own retry decision and user message, so the
//!    categorizer is a total pattern match rather than a class hierarchy.
//!
//! 2. **[`CategorizedError`]**: the transient record created per failed
//!    attempt, carrying the kind, messages, optional [`ErrorContext`] and the
//!    accumulated `retry_history`.
//!
//! 3. **[`ErrorClassification`]**: the cross-crate trait used for monitoring
//!    and retry decisions (`is_retryable`, `severity`, `is_critical`,
//!    `retry_after`).
//!
//! ## Propagation policy
//!
//! | Category | Retried | Cap | Surfaces |
//! |---|---|---|---|
//! | `AUTH`, `VALIDATION`, `SERVICE_UNAVAILABLE` | no | 0 | on first categorization |
//! | `RATE_LIMIT`, `UNKNOWN` | yes | 1 | after exhaustion, with history |
//! | `SERVER`, `NETWORK` | yes | 3 | after exhaustion, with history |

use std::fmt;
use std::time::Duration;

mod categorized;
mod category;

pub use categorized::{CategorizedError, ErrorContext, OperationFailure, RetryAttempt};
pub use category::{ErrorCategory, FailureKind, RetryDecision};

/// Result alias for operations that surface a categorized failure
pub type CategorizedResult<T> = Result<T, CategorizedError>;

/// Standard trait for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network timeouts, rate limiting or server errors.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when a specific delay is recommended (e.g.
    /// derived from a rate-limit reset header), or `None` otherwise.
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
