//! Secret-shaped substring redaction
//!
//! [`SecretRedactor`] masks credentials that tend to leak into error text:
//! GitHub-style tokens, `Authorization` header values and `key=value`
//! pairs whose key names a secret. Matches are replaced by
//! `[REDACTED:<kind>]`.

use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Pure, stateless text scrubber
pub trait Redactor: Send + Sync + Debug {
    /// Return `value` with secret-shaped substrings masked
    fn redact(&self, value: &str) -> String;
}

/// Redactor handle shared between the orchestrator and its callers
pub type SharedRedactor = Arc<dyn Redactor>;

static GITHUB_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:gh[pousr]_[A-Za-z0-9]{20,255}|github_pat_[A-Za-z0-9_]{22,255})\b")
        .expect("GITHUB_TOKEN_REGEX should compile - this is a bug")
});

static AUTH_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bearer|token)\s+([A-Za-z0-9_\-\.=]{8,})")
        .expect("AUTH_HEADER_REGEX should compile - this is a bug")
});

static SECRET_PAIR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|token|secret|api_key)(\s*[=:]\s*)([^\s&,;"']+)"#)
        .expect("SECRET_PAIR_REGEX should compile - this is a bug")
});

/// Default redactor for upstream API diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretRedactor;

impl SecretRedactor {
    /// Shared handle
    pub fn shared() -> SharedRedactor {
        Arc::new(Self)
    }

    fn scrub(value: &str) -> String {
        let value = GITHUB_TOKEN_REGEX.replace_all(value, "[REDACTED:token]");
        let value = AUTH_HEADER_REGEX
            .replace_all(&value, |caps: &Captures<'_>| format!("{} [REDACTED:auth]", &caps[1]))
            .into_owned();
        SECRET_PAIR_REGEX
            .replace_all(&value, |caps: &Captures<'_>| {
                format!("{}{}[REDACTED:{}]", &caps[1], &caps[2], caps[1].to_ascii_lowercase())
            })
            .into_owned()
    }
}

impl Redactor for SecretRedactor {
    fn redact(&self, value: &str) -> String {
        Self::scrub(value)
    }
}

/// Pass-through redactor for tests and trusted sinks
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRedactor;

impl Redactor for NoOpRedactor {
    fn redact(&self, value: &str) -> String {
        value.to_string()
    }
}
