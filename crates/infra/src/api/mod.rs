//! Upstream API client
//!
//! [`UnifiedClient`] fronts both the structured-query endpoint and the REST
//! endpoints. Each call goes through the same steps:
//!
//! - wait out any armed rate-limit window
//! - take a slot from the bounded [`ConnectionPool`]
//! - send through the [`Transport`](crate::http::Transport) under a per-call
//!   timeout
//! - [`normalize`] any failure and retry the retryable ones

pub mod client;
pub mod normalize;
pub mod pool;
pub mod rate_limit;

pub use client::{ApiResponse, CallMetadata, OperationKind, UnifiedClient};
pub use normalize::{normalize, ClientErrorKind, NormalizedError};
pub use pool::{ConnectionPool, ConnectionPoolStatus, PoolError, PoolSlot};
pub use rate_limit::{RateLimitInfo, RateLimitTracker};
