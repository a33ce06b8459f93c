//! Resilience core shared by relaygate crates.
//!
//! Turns opaque upstream failures into a closed taxonomy with an attached
//! retry policy, gates calls behind a circuit breaker and drives retries.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error taxonomy, transport-fault model, categorizer, clock,
//!   redaction and attempt logging
//! - `runtime`: circuit breaker and retry orchestrator (tokio)
//! - `observability`: `tracing-subscriber` bootstrap

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod categorizer;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod fault;
#[cfg(feature = "foundation")]
pub mod observability;
#[cfg(feature = "foundation")]
pub mod privacy;
#[cfg(feature = "foundation")]
pub mod time;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use categorizer::ErrorCategorizer;
#[cfg(feature = "foundation")]
pub use error::{
    CategorizedError, CategorizedResult, ErrorCategory, ErrorClassification, ErrorContext,
    ErrorSeverity, FailureKind, OperationFailure, RetryAttempt, RetryDecision,
};
#[cfg(feature = "foundation")]
pub use fault::{ConnectionCode, GraphQlError, ResponseHeaders, TransportFault};
#[cfg(feature = "foundation")]
pub use observability::{AttemptLogger, AttemptRecord, AttemptStatus, SharedAttemptLogger};
#[cfg(feature = "foundation")]
pub use privacy::{Redactor, SecretRedactor, SharedRedactor};
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, RetryError,
    RetryOrchestrator,
};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SharedClock, SystemClock};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
