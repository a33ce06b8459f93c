//! Observability - attempt logging and subscriber bootstrap
//!
//! - **[`traits`]**: the [`AttemptLogger`] collaborator the retry loop reports
//!   every attempt to, with tracing, no-op and in-memory implementations
//! - **[`subscriber`]**: `tracing-subscriber` setup for binaries and tests
//!   (`observability` feature)

#[cfg(feature = "observability")]
pub mod subscriber;
pub mod traits;

#[cfg(feature = "observability")]
pub use subscriber::{init_tracing, LogFormat};
pub use traits::{
    AttemptLogger, AttemptRecord, AttemptStatus, MemoryAttemptLogger, NoOpAttemptLogger,
    SharedAttemptLogger, TracingAttemptLogger,
};
