//! Client configuration loading and management
//!
//! [`ClientConfig`] is the full configuration surface of the
//! [`UnifiedClient`](crate::api::UnifiedClient). Every field except the token
//! has a default, so a config file may be as small as `token = "..."`.

pub mod loader;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{InfraError, InfraResult};

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

/// Default upstream REST root
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
/// Default cap on concurrent in-flight calls
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
/// Default number of transport-level retries per call
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default per-call timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default bound on how long a call may queue for a pool slot
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 60_000;

/// Configuration for [`UnifiedClient`](crate::api::UnifiedClient)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bearer token sent with every call
    pub token: String,

    /// REST root that endpoint paths are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Structured-query endpoint; `None` means `{base_url}/graphql`
    #[serde(default)]
    pub graphql_url: Option<String>,

    /// Maximum concurrent in-flight calls
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Transport-level retries per call
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff table indexed by retry count, clamped to the last entry
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pool queue-wait bound in milliseconds; `None` or `0` waits indefinitely
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: Option<u64>,

    /// `User-Agent` header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![1_000, 2_000, 4_000]
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_queue_timeout_ms() -> Option<u64> {
    Some(DEFAULT_QUEUE_TIMEOUT_MS)
}

fn default_user_agent() -> String {
    concat!("relaygate/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ClientConfig {
    /// Configuration with defaults for everything but the token
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            base_url: default_base_url(),
            graphql_url: None,
            max_connections: default_max_connections(),
            retry_attempts: default_retry_attempts(),
            retry_delays_ms: default_retry_delays_ms(),
            timeout_ms: default_timeout_ms(),
            queue_timeout_ms: default_queue_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }

    /// Point the client at a different REST root
    #[must_use]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    #[must_use]
    pub fn with_retry_delays_ms(mut self, retry_delays_ms: Vec<u64>) -> Self {
        self.retry_delays_ms = retry_delays_ms;
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_queue_timeout_ms(mut self, queue_timeout_ms: Option<u64>) -> Self {
        self.queue_timeout_ms = queue_timeout_ms;
        self
    }

    /// Structured-query endpoint URL
    pub fn graphql_endpoint(&self) -> String {
        match &self.graphql_url {
            Some(url) => url.clone(),
            None => format!("{}/graphql", self.base_url.trim_end_matches('/')),
        }
    }

    /// Resolve an endpoint path against `base_url`
    pub fn endpoint_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Queue-wait bound; `None` or `Some(0)` disables it
    pub fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Backoff before retry number `retry_count` (zero-based)
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let last = self.retry_delays_ms.len().saturating_sub(1);
        let index = (retry_count as usize).min(last);
        Duration::from_millis(self.retry_delays_ms.get(index).copied().unwrap_or_default())
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`InfraError::Config`] for an empty token, an unparsable base
    /// URL, zero connections, an empty delay table or a zero timeout.
    pub fn validate(&self) -> InfraResult<()> {
        if self.token.trim().is_empty() {
            return Err(InfraError::Config("token must not be empty".to_string()));
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            InfraError::Config(format!("Invalid base_url '{}': {e}", self.base_url))
        })?;
        if let Some(graphql_url) = &self.graphql_url {
            url::Url::parse(graphql_url).map_err(|e| {
                InfraError::Config(format!("Invalid graphql_url '{graphql_url}': {e}"))
            })?;
        }
        if self.max_connections == 0 {
            return Err(InfraError::Config("max_connections must be greater than 0".to_string()));
        }
        if self.retry_delays_ms.is_empty() {
            return Err(InfraError::Config("retry_delays_ms must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(InfraError::Config("timeout_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("graphql_url", &self.graphql_url)
            .field("max_connections", &self.max_connections)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delays_ms", &self.retry_delays_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("queue_timeout_ms", &self.queue_timeout_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
