//! Infrastructure error types.

mod conversions;

use thiserror::Error;

pub use conversions::IntoTransportFault;

/// Failures raised while setting up or running the infrastructure layer
///
/// Upstream call failures are not reported here: those travel as
/// [`TransportFault`](relaygate_common::TransportFault) and are normalized by
/// the client.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Result alias for infrastructure setup
pub type InfraResult<T> = Result<T, InfraError>;

impl From<reqwest::Error> for InfraError {
    fn from(value: reqwest::Error) -> Self {
        InfraError::Http(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_display_their_cause() {
        let config = InfraError::Config("max_connections must be at least 1".into());
        assert_eq!(config.to_string(), "Configuration error: max_connections must be at least 1");

        let http = InfraError::Http("builder error".into());
        assert_eq!(http.to_string(), "HTTP client error: builder error");
    }
}
