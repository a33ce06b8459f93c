//! Resilience patterns for upstream API calls
//!
//! - **Circuit Breaker**: fails fast after repeated failures and admits probe
//!   calls once a cooldown elapses
//! - **Retry Orchestrator**: drives an operation through the breaker, the
//!   categorizer and the per-category retry policy
//!
//! ## Relationship to the client's transport retry
//!
//! `relaygate-infra`'s `UnifiedClient` keeps its own, smaller retry loop for a
//! single transport call (fixed delay table, no breaker). Both loops read the
//! same [`TransportFault`](crate::fault::TransportFault) model:
//!
//! | | [`RetryOrchestrator`] | `UnifiedClient` transport retry |
//! |---|---|---|
//! | **Scope** | Business operation, possibly several calls | One upstream call |
//! | **Taxonomy** | [`ErrorCategory`](crate::error::ErrorCategory) | Client error kinds |
//! | **Delays** | Per category | `retry_delays_ms` table, rate-limit window |
//! | **Breaker** | Yes | No |
//!
//! The client owns one orchestrator so that both entry points share a single
//! breaker for the client's lifetime.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStats,
    CircuitState, ConfigError, ConfigResult, DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT,
    DEFAULT_SUCCESS_THRESHOLD,
};
pub use retry::{RetryError, RetryOrchestrator, RetryOrchestratorBuilder};
