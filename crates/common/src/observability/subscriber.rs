//! `tracing-subscriber` bootstrap
//!
//! Filtering follows `RUST_LOG` and falls back to `info`. Initialization is
//! idempotent: a second call, or a call after another subscriber was
//! installed, is a no-op that returns `false`.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// `Json` when `json` is true
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Install the global subscriber, writing to stderr
///
/// Returns `true` if this call installed it.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)).try_init()
        }
    };
    result.is_ok()
}
