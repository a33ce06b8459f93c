//! Transport-level failure normalization
//!
//! The client retries against a smaller taxonomy than the orchestrator:
//!
//! | Kind | Matches | Retried |
//! |---|---|---|
//! | `AUTH` | 401, or "Bad credentials" | no |
//! | `RATE_LIMIT` | 429, 403 with `x-ratelimit-remaining: 0`, GraphQL `RATE_LIMITED` | yes |
//! | `NETWORK_TIMEOUT` | timeouts, pool queue timeouts | yes |
//! | `API_DEPRECATED` | 410, or "deprecated" in the message | never |
//! | `UNKNOWN_ERROR` | everything else | only 5xx |
//! | `CANCELLED` | caller cancellation | never |
//!
//! Rules are applied top to bottom; the first match wins. A rate limit whose
//! reset lies beyond [`MAX_RATE_LIMIT_WAIT`] is reported but not retried.

use std::fmt;
use std::time::Duration;

use relaygate_common::utils::option_duration_millis;
use relaygate_common::{CategorizedError, OperationFailure, RetryDecision, TransportFault};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::pool::PoolError;
use super::rate_limit::MAX_RATE_LIMIT_WAIT;

const BAD_CREDENTIALS: &str = "bad credentials";
const DEPRECATED: &str = "deprecated";

/// Client-level failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientErrorKind {
    Auth,
    RateLimit,
    NetworkTimeout,
    ApiDeprecated,
    UnknownError,
    Cancelled,
}

impl ClientErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::ApiDeprecated => "API_DEPRECATED",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed client call, normalized
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct NormalizedError {
    pub kind: ClientErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub retryable: bool,
    /// Upstream-requested wait before the next call
    #[serde(
        default,
        rename = "retry_after_ms",
        with = "option_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<Duration>,
    /// Endpoint the call targeted (path or `graphql`)
    pub endpoint: String,
    /// Raw fault behind this error, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<TransportFault>,
}

impl NormalizedError {
    pub(crate) fn new(
        kind: ClientErrorKind,
        message: String,
        endpoint: &str,
        retryable: bool,
    ) -> Self {
        Self {
            kind,
            message,
            status: None,
            retryable,
            retry_after: None,
            endpoint: endpoint.to_string(),
            fault: None,
        }
    }

    /// The caller cancelled the call
    pub fn cancelled(endpoint: &str) -> Self {
        Self::new(ClientErrorKind::Cancelled, "Operation cancelled".to_string(), endpoint, false)
    }

    /// The call never got a pool slot
    pub fn from_pool(error: PoolError, endpoint: &str) -> Self {
        match error {
            PoolError::Cancelled => Self::cancelled(endpoint),
            PoolError::QueueTimeout { waited } => {
                let message = error.to_string();
                Self {
                    fault: Some(TransportFault::Timeout {
                        elapsed: Some(waited),
                        message: message.clone(),
                    }),
                    ..Self::new(ClientErrorKind::NetworkTimeout, message, endpoint, true)
                }
            }
            PoolError::Closed => {
                let message = error.to_string();
                Self {
                    fault: Some(TransportFault::other(message.clone())),
                    ..Self::new(ClientErrorKind::UnknownError, message, endpoint, false)
                }
            }
        }
    }

    /// Whether the client may try again
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Normalize a raw fault observed on `endpoint`
///
/// `now_secs` anchors the `x-ratelimit-reset` → retry-after conversion.
pub fn normalize(fault: TransportFault, endpoint: &str, now_secs: u64) -> NormalizedError {
    let status = fault.status_code();
    let message = fault.technical_message();
    let lower = message.to_ascii_lowercase();

    let is_auth = status == Some(401) || lower.contains(BAD_CREDENTIALS);
    let (kind, retryable, retry_after) = if is_auth {
        (ClientErrorKind::Auth, false, None)
    } else if is_rate_limited(&fault, status) {
        match rate_limit_retry_after(&fault, now_secs) {
            Some(wait) if wait > MAX_RATE_LIMIT_WAIT => {
                warn!(
                    endpoint,
                    retry_after_secs = wait.as_secs(),
                    "Rate-limit reset is implausibly far out; not retrying"
                );
                (ClientErrorKind::RateLimit, false, None)
            }
            retry_after => (ClientErrorKind::RateLimit, true, retry_after),
        }
    } else if fault.is_timeout() {
        (ClientErrorKind::NetworkTimeout, true, None)
    } else if status == Some(410) || lower.contains(DEPRECATED) {
        warn!(endpoint, message = %message, "Upstream reports the API as deprecated");
        (ClientErrorKind::ApiDeprecated, false, None)
    } else {
        let server_error = matches!(status, Some(500..=599));
        (ClientErrorKind::UnknownError, server_error, None)
    };

    NormalizedError {
        kind,
        message,
        status,
        retryable,
        retry_after,
        endpoint: endpoint.to_string(),
        fault: Some(fault),
    }
}

fn is_rate_limited(fault: &TransportFault, status: Option<u16>) -> bool {
    match status {
        Some(429) => true,
        Some(403) => fault.headers().and_then(|h| h.rate_limit_remaining()) == Some(0),
        _ => false,
    }
}

fn rate_limit_retry_after(fault: &TransportFault, now_secs: u64) -> Option<Duration> {
    let headers = fault.headers()?;
    headers
        .rate_limit_reset()
        .map(|reset| Duration::from_secs(reset.saturating_sub(now_secs)))
        .or_else(|| headers.retry_after_secs().map(Duration::from_secs))
}

impl From<NormalizedError> for OperationFailure {
    fn from(error: NormalizedError) -> Self {
        match error.fault {
            Some(fault) if error.kind != ClientErrorKind::Cancelled => {
                OperationFailure::Fault(fault)
            }
            _ => {
                let mut categorized = CategorizedError::unknown(error.status, error.message, 0);
                categorized.retry_decision = RetryDecision::stop(0);
                OperationFailure::Categorized(categorized)
            }
        }
    }
}
