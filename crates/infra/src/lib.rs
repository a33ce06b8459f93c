//! # Relaygate Infrastructure
//!
//! I/O side of relaygate: configuration loading, the reqwest transport and
//! the unified upstream client.
//!
//! ## Architecture
//! - Retry, circuit breaking and error categorization live in
//!   `relaygate-common`
//! - This crate owns everything that touches the network or the environment

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod config;
pub mod errors;
pub mod http;

pub use api::{
    ApiResponse, CallMetadata, ClientErrorKind, ConnectionPoolStatus, NormalizedError,
    OperationKind, RateLimitInfo, UnifiedClient,
};
pub use config::ClientConfig;
pub use errors::{InfraError, InfraResult};
pub use http::{HttpTransport, Transport, TransportRequest, TransportResponse};
