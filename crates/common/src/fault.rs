//! Closed model of raw transport failures
//!
//! Transport adapters translate whatever their HTTP stack reports into one
//! of the [`TransportFault`] variants below. The categorizer and the client
//! normalizer then pattern-match this closed set instead of probing loosely
//! shaped error values.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::privacy::Redactor;
use crate::utils::option_duration_millis;

/// GraphQL `extensions.code` / `type` signalling an exhausted quota
pub const GRAPHQL_RATE_LIMITED: &str = "RATE_LIMITED";

/// Header carrying the unix second at which the rate-limit window resets
pub const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";
/// Header carrying the remaining request quota
pub const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying the total request quota
pub const HEADER_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the quota consumed in the current window
pub const HEADER_RATELIMIT_USED: &str = "x-ratelimit-used";
/// Standard `Retry-After` header (seconds form)
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Snapshot of response headers with lower-cased names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseHeaders(BTreeMap<String, String>);

impl ResponseHeaders {
    /// Empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header; the name is lower-cased
    pub fn insert<K: AsRef<str>, V: Into<String>>(&mut self, name: K, value: V) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Insert a header (fluent API)
    #[must_use]
    pub fn with<K: AsRef<str>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.insert(name, value);
        self
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Header parsed as an unsigned integer
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(|value| value.trim().parse().ok())
    }

    /// `x-ratelimit-reset` as unix seconds
    pub fn rate_limit_reset(&self) -> Option<u64> {
        self.get_u64(HEADER_RATELIMIT_RESET)
    }

    /// `x-ratelimit-remaining`
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        self.get_u64(HEADER_RATELIMIT_REMAINING)
    }

    /// `retry-after` in seconds
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.get_u64(HEADER_RETRY_AFTER)
    }

    /// Whether no headers were captured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// One entry of a GraphQL `errors[]` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Top-level `type` field some servers emit
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// `extensions.code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl GraphQlError {
    /// Error with only a message
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    /// Build from a raw `errors[]` JSON entry, reading `extensions.code`
    pub fn from_json(value: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        Self {
            message: text(value.get("message")).unwrap_or_default(),
            error_type: text(value.get("type")),
            code: text(value.pointer("/extensions/code")),
        }
    }

    /// Whether this error reports an exhausted quota
    pub fn is_rate_limited(&self) -> bool {
        self.code.as_deref() == Some(GRAPHQL_RATE_LIMITED)
            || self.error_type.as_deref() == Some(GRAPHQL_RATE_LIMITED)
    }
}

/// OS-level connection failure codes the upstream client reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
pub enum ConnectionCode {
    /// Socket operation timed out
    ETIMEDOUT,
    /// Peer refused the connection
    ECONNREFUSED,
    /// Peer reset the connection
    ECONNRESET,
    /// DNS name not found
    ENOTFOUND,
    /// No route to the network
    ENETUNREACH,
    /// Temporary DNS failure
    EAI_AGAIN,
}

impl ConnectionCode {
    /// Code name as reported by the OS
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ETIMEDOUT => "ETIMEDOUT",
            Self::ECONNREFUSED => "ECONNREFUSED",
            Self::ECONNRESET => "ECONNRESET",
            Self::ENOTFOUND => "ENOTFOUND",
            Self::ENETUNREACH => "ENETUNREACH",
            Self::EAI_AGAIN => "EAI_AGAIN",
        }
    }

    /// Best-effort inference from an error chain's text
    ///
    /// Returns `None` when nothing recognisable appears, so callers can fall
    /// back to a different fault variant.
    pub fn infer(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("etimedout") {
            Some(Self::ETIMEDOUT)
        } else if lower.contains("refused") {
            Some(Self::ECONNREFUSED)
        } else if lower.contains("reset") || lower.contains("broken pipe") {
            Some(Self::ECONNRESET)
        } else if lower.contains("temporary failure in name resolution")
            || lower.contains("eai_again")
        {
            Some(Self::EAI_AGAIN)
        } else if lower.contains("dns")
            || lower.contains("name or service not known")
            || lower.contains("no such host")
        {
            Some(Self::ENOTFOUND)
        } else if lower.contains("unreachable") {
            Some(Self::ENETUNREACH)
        } else {
            None
        }
    }
}

impl fmt::Display for ConnectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw failure reported by a transport adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum TransportFault {
    /// Upstream answered with a non-success status
    Status {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_text: Option<String>,
        /// Response header snapshot
        #[serde(default, skip_serializing_if = "ResponseHeaders::is_empty")]
        headers: ResponseHeaders,
        /// Parsed JSON body, when the body was JSON
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        /// Adapter-level message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// GraphQL response carrying an `errors[]` array
    GraphQl {
        /// Reported errors, in response order
        errors: Vec<GraphQlError>,
        /// Response header snapshot
        #[serde(default, skip_serializing_if = "ResponseHeaders::is_empty")]
        headers: ResponseHeaders,
        /// Adapter-level message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Socket-level failure
    Connection {
        /// OS error code
        code: ConnectionCode,
        /// Underlying error text
        message: String,
    },
    /// The call exceeded its deadline
    Timeout {
        /// Time spent before giving up
        #[serde(default, with = "option_duration_millis", skip_serializing_if = "Option::is_none")]
        elapsed: Option<Duration>,
        /// Underlying error text
        message: String,
    },
    /// Anything else the adapter could not classify
    Other {
        /// Underlying error text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Extra diagnostic payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
}

impl TransportFault {
    /// Status fault with no headers or body
    pub fn status(status: u16) -> Self {
        Self::status_with_headers(status, ResponseHeaders::new())
    }

    /// Status fault carrying headers
    pub fn status_with_headers(status: u16, headers: ResponseHeaders) -> Self {
        Self::Status { status, status_text: None, headers, body: None, message: None }
    }

    /// Connection fault
    pub fn connection<S: Into<String>>(code: ConnectionCode, message: S) -> Self {
        Self::Connection { code, message: message.into() }
    }

    /// Timeout fault
    pub fn timeout(elapsed: Option<Duration>) -> Self {
        let message = match elapsed {
            Some(d) => format!("Request timed out after {}ms", d.as_millis()),
            None => "Request timed out".to_string(),
        };
        Self::Timeout { elapsed, message }
    }

    /// Unclassified fault with a message
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other { message: Some(message.into()), detail: None }
    }

    /// Copy of this fault with every piece of free text passed through
    /// `redactor`
    ///
    /// Status codes, connection codes and headers are kept as they are, so
    /// categorization and rate-limit handling see the same fault.
    #[must_use]
    pub fn redacted(self, redactor: &dyn Redactor) -> Self {
        let text = |value: String| redactor.redact(&value);
        let opt = |value: Option<String>| value.map(|v| redactor.redact(&v));
        match self {
            Self::Status { status, status_text, headers, body, message } => Self::Status {
                status,
                status_text: opt(status_text),
                headers,
                body: body.map(|b| redact_value(b, redactor)),
                message: opt(message),
            },
            Self::GraphQl { errors, headers, message } => Self::GraphQl {
                errors: errors
                    .into_iter()
                    .map(|e| GraphQlError { message: text(e.message), ..e })
                    .collect(),
                headers,
                message: opt(message),
            },
            Self::Connection { code, message } => Self::Connection { code, message: text(message) },
            Self::Timeout { elapsed, message } => Self::Timeout { elapsed, message: text(message) },
            Self::Other { message, detail } => Self::Other {
                message: opt(message),
                detail: detail.map(|d| redact_value(d, redactor)),
            },
        }
    }

    /// Effective status code
    ///
    /// A GraphQL fault reporting `RATE_LIMITED` counts as 429.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::GraphQl { errors, .. } if errors.iter().any(GraphQlError::is_rate_limited) => {
                Some(429)
            }
            _ => None,
        }
    }

    /// Response headers, when the fault came with a response
    pub fn headers(&self) -> Option<&ResponseHeaders> {
        match self {
            Self::Status { headers, .. } | Self::GraphQl { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Adapter-level message, if one was recorded
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. }
            | Self::GraphQl { message, .. }
            | Self::Other { message, .. } => message.as_deref(),
            Self::Connection { message, .. } | Self::Timeout { message, .. } => Some(message),
        }
    }

    /// Message for logs, first available of: adapter message, body
    /// `message`, status text, body `data.message`, joined GraphQL messages,
    /// the fault serialized as JSON, `"Unknown error"`
    pub fn technical_message(&self) -> String {
        if let Some(message) = self.message().filter(|m| !m.is_empty()) {
            return message.to_string();
        }

        if let Self::Status { body, status_text, .. } = self {
            let body_text = |pointer: &str| {
                body.as_ref()
                    .and_then(|b| b.pointer(pointer))
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
            };
            if let Some(message) = body_text("/message") {
                return message.to_string();
            }
            if let Some(text) = status_text.as_deref().filter(|t| !t.is_empty()) {
                return text.to_string();
            }
            if let Some(message) = body_text("/data/message") {
                return message.to_string();
            }
        }

        if let Self::GraphQl { errors, .. } = self {
            let joined = errors
                .iter()
                .map(|e| e.message.as_str())
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            if !joined.is_empty() {
                return joined;
            }
        }

        if let Self::Other { detail, .. } = self {
            return detail.as_ref().map_or_else(|| "Unknown error".to_string(), Value::to_string);
        }

        serde_json::to_string(self).unwrap_or_else(|_| "Unknown error".to_string())
    }

    /// Whether this is a timeout-shaped fault
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Connection { code, .. } => *code == ConnectionCode::ETIMEDOUT,
            _ => self.message().is_some_and(|m| m.to_ascii_lowercase().contains("timeout")),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, .. } => {
                write!(f, "HTTP {}: {}", status, self.technical_message())
            }
            Self::Connection { code, message } => write!(f, "{code}: {message}"),
            _ => f.write_str(&self.technical_message()),
        }
    }
}

impl std::error::Error for TransportFault {}

/// Redact every string inside a JSON value
fn redact_value(value: Value, redactor: &dyn Redactor) -> Value {
    match value {
        Value::String(text) => Value::String(redactor.redact(&text)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| redact_value(v, redactor)).collect())
        }
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, redact_value(v, redactor))).collect())
        }
        other => other,
    }
}
