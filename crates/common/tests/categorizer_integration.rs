//! Integration tests for `relaygate_common::categorizer`.
//!
//! Exercises the decision table through the public API with faults shaped
//! the way transport adapters produce them.

use relaygate_common::categorizer::ErrorCategorizer;
use relaygate_common::error::{ErrorCategory, ErrorClassification, ErrorSeverity, FailureKind};
use relaygate_common::fault::{GraphQlError, ResponseHeaders, TransportFault};
use relaygate_common::time::MockClock;
use serde_json::json;

const NOW_SECS: u64 = 1_700_000_000;

fn categorizer() -> ErrorCategorizer {
    ErrorCategorizer::new(MockClock::at_unix_secs(NOW_SECS).shared())
}

#[test]
fn test_rate_limit_reads_reset_header() {
    let reset = NOW_SECS + 90;
    let fault = TransportFault::status_with_headers(
        429,
        ResponseHeaders::new().with("x-ratelimit-reset", reset.to_string()),
    );

    let err = categorizer().categorize(&fault, 0, None);

    assert_eq!(err.category(), ErrorCategory::RateLimit);
    assert_eq!(err.rate_limit_reset(), Some(reset));
    assert!(err.retry_decision.should_retry);
    assert_eq!(err.retry_decision.max_retries, 1);
    assert_eq!(err.retry_decision.delay_ms(), 90_000);
    assert_eq!(err.severity(), ErrorSeverity::Warning);
}

#[test]
fn test_server_error_backoff_by_attempt() {
    let fault = TransportFault::status(500);
    let c = categorizer();

    let second_retry = c.categorize(&fault, 2, None);
    assert_eq!(second_retry.retry_decision.delay_ms(), 4_000);
    assert!(second_retry.retry_decision.should_retry);

    let exhausted = c.categorize(&fault, 3, None);
    assert!(!exhausted.retry_decision.should_retry);
    assert_eq!(exhausted.retry_decision.max_retries, 3);
}

#[test]
fn test_graphql_rate_limited_is_treated_as_429() {
    let fault = TransportFault::GraphQl {
        errors: vec![GraphQlError::from_json(&json!({
            "type": "RATE_LIMITED",
            "message": "API rate limit exceeded for user ID 1."
        }))],
        headers: ResponseHeaders::new(),
        message: None,
    };

    let err = categorizer().categorize(&fault, 0, None);
    assert_eq!(err.category(), ErrorCategory::RateLimit);
    assert_eq!(err.status_code, Some(429));
    assert_eq!(err.technical_message, "API rate limit exceeded for user ID 1.");
}

#[test]
fn test_auth_messages_distinguish_credentials_from_permissions() {
    let c = categorizer();
    let unauthorized = c.categorize(&TransportFault::status(401), 0, None);
    let forbidden = c.categorize(&TransportFault::status(403), 0, None);

    assert_eq!(unauthorized.kind, FailureKind::Auth { forbidden: false });
    assert_eq!(forbidden.kind, FailureKind::Auth { forbidden: true });
    assert_ne!(unauthorized.user_message, forbidden.user_message);
    assert!(!unauthorized.is_retryable());
    assert_eq!(unauthorized.retry_decision.delay_ms(), 0);
}

#[test]
fn test_validation_message_points_at_parameters() {
    let fault = TransportFault::Status {
        status: 422,
        status_text: Some("Unprocessable Entity".into()),
        headers: ResponseHeaders::new(),
        body: Some(json!({ "message": "Validation Failed", "errors": [] })),
        message: None,
    };

    let err = categorizer().categorize(&fault, 0, None);
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(err.technical_message, "Validation Failed");
    assert!(err.user_message.contains("check the request parameters"));
}

#[test]
fn test_categorized_error_serializes_for_diagnostics() {
    let err = categorizer().categorize(&TransportFault::status(502), 1, None);
    let value = serde_json::to_value(&err).unwrap();

    assert_eq!(value["kind"]["category"], "SERVER");
    assert_eq!(value["status_code"], 502);
    assert_eq!(value["retry_decision"]["delay_ms"], 2_000);
    assert_eq!(value["retry_decision"]["attempt"], 1);
}
