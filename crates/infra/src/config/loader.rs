//! Configuration loader
//!
//! Loads the client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the token is missing there, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `RELAYGATE_TOKEN`: Bearer token (required)
//! - `RELAYGATE_BASE_URL`: REST root
//! - `RELAYGATE_GRAPHQL_URL`: Structured-query endpoint
//! - `RELAYGATE_MAX_CONNECTIONS`: Concurrent call cap
//! - `RELAYGATE_RETRY_ATTEMPTS`: Transport-level retries per call
//! - `RELAYGATE_RETRY_DELAYS_MS`: Comma-separated backoff table, e.g. `1000,2000,4000`
//! - `RELAYGATE_TIMEOUT_MS`: Per-call timeout
//! - `RELAYGATE_QUEUE_TIMEOUT_MS`: Pool queue-wait bound (`0` disables it)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./relaygate.json` or `./relaygate.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. The same names in the parent directory
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::ClientConfig;
use crate::errors::{InfraError, InfraResult};

const ENV_TOKEN: &str = "RELAYGATE_TOKEN";
const ENV_BASE_URL: &str = "RELAYGATE_BASE_URL";
const ENV_GRAPHQL_URL: &str = "RELAYGATE_GRAPHQL_URL";
const ENV_MAX_CONNECTIONS: &str = "RELAYGATE_MAX_CONNECTIONS";
const ENV_RETRY_ATTEMPTS: &str = "RELAYGATE_RETRY_ATTEMPTS";
const ENV_RETRY_DELAYS_MS: &str = "RELAYGATE_RETRY_DELAYS_MS";
const ENV_TIMEOUT_MS: &str = "RELAYGATE_TIMEOUT_MS";
const ENV_QUEUE_TIMEOUT_MS: &str = "RELAYGATE_QUEUE_TIMEOUT_MS";

const CONFIG_FILE_NAMES: [&str; 4] =
    ["relaygate.json", "relaygate.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the token is not
/// set there (or a variable is malformed), falls back to a config file.
///
/// # Errors
/// Returns `InfraError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> InfraResult<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Only `RELAYGATE_TOKEN` is required; every other setting falls back to
/// its default when unset.
///
/// # Errors
/// Returns `InfraError::Config` if the token is missing, a variable has an
/// invalid value, or the result fails validation.
pub fn load_from_env() -> InfraResult<ClientConfig> {
    let mut config = ClientConfig::new(env_var(ENV_TOKEN)?);

    if let Some(base_url) = env_opt(ENV_BASE_URL) {
        config.base_url = base_url;
    }
    if let Some(graphql_url) = env_opt(ENV_GRAPHQL_URL) {
        config.graphql_url = Some(graphql_url);
    }

    if let Some(max) = env_parse::<usize>(ENV_MAX_CONNECTIONS)? {
        config.max_connections = max;
    }
    if let Some(attempts) = env_parse::<u32>(ENV_RETRY_ATTEMPTS)? {
        config.retry_attempts = attempts;
    }
    if let Some(raw) = env_opt(ENV_RETRY_DELAYS_MS) {
        config.retry_delays_ms = parse_delay_list(&raw)?;
    }
    if let Some(timeout) = env_parse::<u64>(ENV_TIMEOUT_MS)? {
        config.timeout_ms = timeout;
    }
    if let Some(queue_timeout) = env_parse::<u64>(ENV_QUEUE_TIMEOUT_MS)? {
        config.queue_timeout_ms = (queue_timeout > 0).then_some(queue_timeout);
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `InfraError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> InfraResult<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(InfraError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            InfraError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| InfraError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> InfraResult<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| InfraError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(InfraError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the working directory, its parent, then the executable's
/// directory for `relaygate.{json,toml}` and `config.{json,toml}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `InfraError::Config` if the variable is not set or blank.
fn env_var(key: &str) -> InfraResult<String> {
    env_opt(key).ok_or_else(|| {
        InfraError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Optional environment variable; blank values count as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an optional numeric environment variable
fn env_parse<T>(key: &str) -> InfraResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| InfraError::Config(format!("Invalid value for {key} ('{raw}'): {e}")))
        })
        .transpose()
}

/// Parse `1000, 2000,4000` into a delay table
fn parse_delay_list(raw: &str) -> InfraResult<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|e| {
                InfraError::Config(format!(
                    "Invalid retry delay '{part}' in {ENV_RETRY_DELAYS_MS}: {e}"
                ))
            })
        })
        .collect()
}
