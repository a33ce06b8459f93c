//! Maps raw transport faults onto the closed error taxonomy
//!
//! | Condition | Kind |
//! |---|---|
//! | status 429 (or GraphQL `RATE_LIMITED`) | [`FailureKind::RateLimit`] |
//! | status 401 / 403 | [`FailureKind::Auth`] |
//! | status 400 / 422 | [`FailureKind::Validation`] |
//! | status 500..=599 | [`FailureKind::Server`] |
//! | connection codes, timeouts, timeout/network/connection messages | [`FailureKind::Network`] |
//! | anything else | [`FailureKind::Unknown`] |

use std::time::Duration;

use tracing::debug;

use crate::error::{CategorizedError, ErrorContext, FailureKind};
use crate::fault::TransportFault;
use crate::time::{SharedClock, SystemClock};

/// Reset assumed when a 429 carries no `x-ratelimit-reset` header
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

const NETWORK_MESSAGE_MARKERS: [&str; 3] = ["timeout", "network", "connection"];

/// Stateless categorizer; the clock is only read for rate-limit delays
#[derive(Clone)]
pub struct ErrorCategorizer {
    clock: SharedClock,
}

impl std::fmt::Debug for ErrorCategorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCategorizer").finish_non_exhaustive()
    }
}

impl Default for ErrorCategorizer {
    fn default() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl ErrorCategorizer {
    /// Categorizer reading "now" from `clock`
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Categorize a fault observed on zero-based `attempt`
    pub fn categorize(
        &self,
        fault: &TransportFault,
        attempt: u32,
        context: Option<ErrorContext>,
    ) -> CategorizedError {
        let now_ms = self.clock.millis_since_epoch();
        let status = fault.status_code();
        let kind = classify(fault, status, now_ms);

        debug!(
            category = %kind.category(),
            status = ?status,
            attempt,
            operation = context.as_ref().map(|c| c.operation.as_str()),
            "Categorized upstream failure"
        );

        CategorizedError::from_kind(kind, status, fault.technical_message(), attempt, now_ms)
            .with_context(context)
    }
}

fn classify(fault: &TransportFault, status: Option<u16>, now_ms: u64) -> FailureKind {
    match status {
        Some(429) => {
            let reset_at_secs = fault
                .headers()
                .and_then(|h| h.rate_limit_reset())
                .unwrap_or_else(|| now_ms / 1_000 + DEFAULT_RATE_LIMIT_WINDOW.as_secs());
            FailureKind::RateLimit { reset_at_secs }
        }
        Some(401) => FailureKind::Auth { forbidden: false },
        Some(403) => FailureKind::Auth { forbidden: true },
        Some(400 | 422) => FailureKind::Validation,
        Some(500..=599) => FailureKind::Server,
        _ if is_network_fault(fault) => FailureKind::Network,
        _ => FailureKind::Unknown,
    }
}

fn is_network_fault(fault: &TransportFault) -> bool {
    match fault {
        TransportFault::Connection { .. } | TransportFault::Timeout { .. } => true,
        other => other.message().is_some_and(|message| {
            let lower = message.to_ascii_lowercase();
            NETWORK_MESSAGE_MARKERS.iter().any(|marker| lower.contains(marker))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::fault::{ConnectionCode, ResponseHeaders};
    use crate::time::MockClock;

    const NOW_SECS: u64 = 1_700_000_000;

    fn categorizer() -> ErrorCategorizer {
        ErrorCategorizer::new(MockClock::at_unix_secs(NOW_SECS).shared())
    }

    #[test]
    fn test_status_table() {
        let c = categorizer();
        let cases = [
            (401, ErrorCategory::Auth),
            (403, ErrorCategory::Auth),
            (400, ErrorCategory::Validation),
            (422, ErrorCategory::Validation),
            (500, ErrorCategory::Server),
            (503, ErrorCategory::Server),
            (599, ErrorCategory::Server),
            (404, ErrorCategory::Unknown),
            (409, ErrorCategory::Unknown),
        ];
        for (status, expected) in cases {
            let err = c.categorize(&TransportFault::status(status), 0, None);
            assert_eq!(err.category(), expected, "status {status}");
            assert_eq!(err.status_code, Some(status));
        }
    }

    #[test]
    fn test_rate_limit_without_header_defaults_to_one_minute() {
        let err = categorizer().categorize(&TransportFault::status(429), 0, None);
        assert_eq!(err.rate_limit_reset(), Some(NOW_SECS + 60));
        assert_eq!(err.retry_decision.delay_ms(), 60_000);
    }

    #[test]
    fn test_network_faults() {
        let c = categorizer();
        let faults = [
            TransportFault::connection(ConnectionCode::ECONNREFUSED, "refused"),
            TransportFault::connection(ConnectionCode::EAI_AGAIN, "dns"),
            TransportFault::timeout(None),
            TransportFault::other("socket hang up: Connection closed"),
            TransportFault::other("Network is down"),
            TransportFault::other("read TIMEOUT"),
        ];
        for fault in faults {
            let err = c.categorize(&fault, 1, None);
            assert_eq!(err.category(), ErrorCategory::Network, "{fault:?}");
            assert_eq!(err.retry_decision.delay_ms(), 2_000);
        }
    }

    #[test]
    fn test_unrecognised_fault_is_unknown() {
        let err = categorizer().categorize(&TransportFault::other("boom"), 0, None);
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.retry_decision.should_retry);
        assert_eq!(err.retry_decision.max_retries, 1);
        assert_eq!(err.retry_decision.delay_ms(), 1_000);
    }

    #[test]
    fn test_status_wins_over_network_message() {
        let fault = TransportFault::Status {
            status: 401,
            status_text: None,
            headers: ResponseHeaders::new(),
            body: None,
            message: Some("connection rejected credentials".into()),
        };
        let err = categorizer().categorize(&fault, 0, None);
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_context_is_attached() {
        let ctx = ErrorContext::new("projects.list");
        let err = categorizer().categorize(&TransportFault::status(500), 0, Some(ctx.clone()));
        assert_eq!(err.context, Some(ctx));
        assert!(err.retry_history.is_empty());
    }
}
