//! Rate-limit window and quota snapshot
//!
//! The tracker keeps the most recent quota seen on any response, plus the
//! window during which the upstream told us to stay away. Every call waits
//! for that window to pass before it takes a pool slot, so a retry scheduled
//! by a rate-limit response is deferred until the upstream window elapses.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use relaygate_common::fault::{
    ResponseHeaders, HEADER_RATELIMIT_LIMIT, HEADER_RATELIMIT_REMAINING, HEADER_RATELIMIT_RESET,
    HEADER_RATELIMIT_USED,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

/// Longest window the tracker will hold calls back for
///
/// Upstream quota windows last an hour; a reset further out than that is
/// treated as bogus rather than waited on.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60 * 60);

/// Upstream quota for the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests allowed per window
    pub limit: u64,
    /// Requests left in the window
    pub remaining: u64,
    /// Unix second at which the window resets
    pub reset: u64,
    /// Requests consumed in the window
    #[serde(default)]
    pub used: u64,
}

impl RateLimitInfo {
    /// Read `x-ratelimit-*` headers; `None` unless limit, remaining and reset
    /// are all present
    pub fn from_headers(headers: &ResponseHeaders) -> Option<Self> {
        let limit = headers.get_u64(HEADER_RATELIMIT_LIMIT)?;
        let remaining = headers.get_u64(HEADER_RATELIMIT_REMAINING)?;
        let reset = headers.get_u64(HEADER_RATELIMIT_RESET)?;
        let used = headers
            .get_u64(HEADER_RATELIMIT_USED)
            .unwrap_or_else(|| limit.saturating_sub(remaining));
        Some(Self { limit, remaining, reset, used })
    }

    /// Read a `/rate_limit` body, preferring `resources.core` over `rate`
    pub fn from_body(body: &Value) -> Option<Self> {
        let section = body.pointer("/resources/core").or_else(|| body.get("rate"))?;
        let mut info: Self = serde_json::from_value(section.clone()).ok()?;
        if section.get("used").is_none() {
            info.used = info.limit.saturating_sub(info.remaining);
        }
        Some(info)
    }

    /// Whether the quota is used up
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Reset instant as a UTC timestamp
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.reset).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// Shared quota cache and rate-limit window
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    latest: Mutex<Option<RateLimitInfo>>,
    blocked_until: Mutex<Option<Instant>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the latest quota
    pub fn record(&self, info: RateLimitInfo) {
        *self.latest.lock() = Some(info);
    }

    /// Remember the quota carried by `headers`, if any
    pub fn observe_headers(&self, headers: &ResponseHeaders) {
        if let Some(info) = RateLimitInfo::from_headers(headers) {
            debug!(remaining = info.remaining, limit = info.limit, "Rate limit observed");
            self.record(info);
        }
    }

    /// Most recent quota seen, without calling upstream
    pub fn latest(&self) -> Option<RateLimitInfo> {
        *self.latest.lock()
    }

    /// Hold every call back for `retry_after`, capped at
    /// [`MAX_RATE_LIMIT_WAIT`]
    ///
    /// An already-armed window is only ever extended, never shortened.
    pub fn block_for(&self, retry_after: Duration) {
        let retry_after = retry_after.min(MAX_RATE_LIMIT_WAIT);
        let now = Instant::now();
        let until = now.checked_add(retry_after).unwrap_or(now);
        let mut blocked = self.blocked_until.lock();
        if blocked.map_or(true, |current| current < until) {
            info!(retry_after_ms = retry_after.as_millis() as u64, "Rate-limit window armed");
            *blocked = Some(until);
        }
    }

    /// Time left in the window, `None` once it has passed
    pub fn blocked_for(&self) -> Option<Duration> {
        let until = (*self.blocked_until.lock())?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Wait until the window (including any extension made meanwhile) passes
    pub async fn wait_for_window(&self) {
        loop {
            let until = match *self.blocked_until.lock() {
                Some(until) if until > Instant::now() => until,
                _ => return,
            };
            debug!(
                wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Waiting for rate-limit window"
            );
            tokio::time::sleep_until(until).await;
        }
    }
}
