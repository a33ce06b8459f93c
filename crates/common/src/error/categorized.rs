//! The categorized failure record produced for every failed attempt.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::{ErrorCategory, FailureKind, RetryDecision};
use super::{ErrorClassification, ErrorSeverity};
use crate::fault::TransportFault;

/// Caller-supplied description of the operation being attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Logical operation name, e.g. `issues.create`
    pub operation: String,
    /// Resource the operation targets, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form diagnostic fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Context for a named operation
    pub fn new<S: Into<String>>(operation: S) -> Self {
        Self { operation: operation.into(), ..Self::default() }
    }

    /// Attach the targeted resource (fluent API)
    pub fn with_resource<S: Into<String>>(mut self, resource: S) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attach a metadata field (fluent API)
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One failed attempt recorded on the final error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-based attempt number
    pub attempt: u32,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
    /// Technical message of that attempt's failure
    pub error: String,
}

/// Normalized failure with category, messages and retry policy
///
/// Created once per failed attempt and discarded once the operation succeeds
/// or exhausts its retries. The final error carries the complete
/// `retry_history` of the call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{}] {}", .kind.category(), .technical_message)]
pub struct CategorizedError {
    /// Category-specific data
    pub kind: FailureKind,
    /// Upstream status code, when the failure came with one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Message intended for logs
    pub technical_message: String,
    /// Remediation sentence intended for display
    pub user_message: String,
    /// Policy the retry loop follows
    pub retry_decision: RetryDecision,
    /// Operation context, if the caller supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Prior failed attempts of the same call, oldest first
    #[serde(default)]
    pub retry_history: Vec<RetryAttempt>,
}

impl CategorizedError {
    /// Build an error for `kind`, computing its decision and user message
    pub fn from_kind<S: Into<String>>(
        kind: FailureKind,
        status_code: Option<u16>,
        technical_message: S,
        attempt: u32,
        now_ms: u64,
    ) -> Self {
        Self {
            retry_decision: kind.retry_decision(attempt, now_ms),
            user_message: kind.user_message(),
            kind,
            status_code,
            technical_message: technical_message.into(),
            context: None,
            retry_history: Vec::new(),
        }
    }

    /// 429 / GraphQL `RATE_LIMITED`
    pub fn rate_limit<S: Into<String>>(
        reset_at_secs: u64,
        technical_message: S,
        attempt: u32,
        now_ms: u64,
    ) -> Self {
        Self::from_kind(
            FailureKind::RateLimit { reset_at_secs },
            Some(429),
            technical_message,
            attempt,
            now_ms,
        )
    }

    /// 401 or 403
    pub fn auth<S: Into<String>>(status_code: u16, technical_message: S, attempt: u32) -> Self {
        Self::from_kind(
            FailureKind::Auth { forbidden: status_code == 403 },
            Some(status_code),
            technical_message,
            attempt,
            0,
        )
    }

    /// 400 or 422
    pub fn validation<S: Into<String>>(
        status_code: u16,
        technical_message: S,
        attempt: u32,
    ) -> Self {
        Self::from_kind(FailureKind::Validation, Some(status_code), technical_message, attempt, 0)
    }

    /// 5xx
    pub fn server<S: Into<String>>(status_code: u16, technical_message: S, attempt: u32) -> Self {
        Self::from_kind(FailureKind::Server, Some(status_code), technical_message, attempt, 0)
    }

    /// Connection fault or timeout
    pub fn network<S: Into<String>>(technical_message: S, attempt: u32) -> Self {
        Self::from_kind(FailureKind::Network, None, technical_message, attempt, 0)
    }

    /// Anything unrecognised
    pub fn unknown<S: Into<String>>(
        status_code: Option<u16>,
        technical_message: S,
        attempt: u32,
    ) -> Self {
        Self::from_kind(FailureKind::Unknown, status_code, technical_message, attempt, 0)
    }

    /// Circuit open; calls resume after `retry_in`
    pub fn service_unavailable(retry_in: Duration) -> Self {
        let technical_message = format!(
            "Circuit breaker is open; next attempt allowed in {}ms",
            retry_in.as_millis()
        );
        Self::from_kind(
            FailureKind::ServiceUnavailable { retry_in },
            Some(503),
            technical_message,
            0,
            0,
        )
    }

    /// Attach operation context (fluent API)
    #[must_use]
    pub fn with_context(mut self, context: Option<ErrorContext>) -> Self {
        self.context = context;
        self
    }

    /// Replace the retry history (fluent API)
    #[must_use]
    pub fn with_history(mut self, history: Vec<RetryAttempt>) -> Self {
        self.retry_history = history;
        self
    }

    /// Category of this error
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Rate-limit reset (unix seconds) for `RATE_LIMIT` errors
    pub const fn rate_limit_reset(&self) -> Option<u64> {
        match self.kind {
            FailureKind::RateLimit { reset_at_secs } => Some(reset_at_secs),
            _ => None,
        }
    }

    /// Whether the retry loop may attempt again after this failure
    pub const fn allows_another_attempt(&self) -> bool {
        self.retry_decision.allows_another_attempt()
    }

    /// Structured key-value pairs for logging
    pub fn as_tracing_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("category", self.category().to_string()),
            ("message", self.technical_message.clone()),
            ("should_retry", self.retry_decision.should_retry.to_string()),
            ("attempt", self.retry_decision.attempt.to_string()),
        ];
        if let Some(status) = self.status_code {
            fields.push(("status_code", status.to_string()));
        }
        if let Some(context) = &self.context {
            fields.push(("operation", context.operation.clone()));
        }
        if !self.retry_history.is_empty() {
            fields.push(("attempts", self.retry_history.len().to_string()));
        }
        fields
    }
}

impl ErrorClassification for CategorizedError {
    fn is_retryable(&self) -> bool {
        self.retry_decision.should_retry
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            FailureKind::RateLimit { .. }
            | FailureKind::Network
            | FailureKind::ServiceUnavailable { .. } => ErrorSeverity::Warning,
            FailureKind::Auth { .. }
            | FailureKind::Validation
            | FailureKind::Server
            | FailureKind::Unknown => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            FailureKind::RateLimit { .. } | FailureKind::ServiceUnavailable { .. } => {
                Some(self.retry_decision.delay)
            }
            _ => None,
        }
    }
}

/// Failure returned by an operation handed to the retry orchestrator
///
/// Operations either report a raw [`TransportFault`], which the orchestrator
/// categorizes with the current attempt number, or an already
/// [`CategorizedError`], which is used as-is.
#[derive(Debug, Clone)]
pub enum OperationFailure {
    /// Already categorized; its retry decision is honoured unchanged
    Categorized(CategorizedError),
    /// Raw transport fault to be categorized
    Fault(TransportFault),
}

impl From<CategorizedError> for OperationFailure {
    fn from(error: CategorizedError) -> Self {
        Self::Categorized(error)
    }
}

impl From<TransportFault> for OperationFailure {
    fn from(fault: TransportFault) -> Self {
        Self::Fault(fault)
    }
}
