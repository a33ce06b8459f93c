//! Attempt logging collaborator
//!
//! The retry orchestrator reports every attempt, successful, failed or
//! rejected by the circuit breaker, as an [`AttemptRecord`]. Implementations
//! decide where records go; the orchestrator redacts the error text before
//! handing a record over.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::duration_millis;

/// Outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The operation returned a value
    Success,
    /// The operation failed
    Failure,
    /// The circuit breaker refused to run the operation
    Rejected,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One attempt as seen by the logging collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Logical operation name
    pub operation: String,
    /// Zero-based attempt number
    pub attempt: u32,
    pub status: AttemptStatus,
    /// Wall time spent in the operation
    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,
    /// Redacted error text for failed or rejected attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Receives a record for every attempt
pub trait AttemptLogger: Send + Sync + Debug {
    /// Record one attempt
    fn log_attempt(&self, record: AttemptRecord);

    /// Check if logging is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Logger handle shared between clones of an orchestrator
pub type SharedAttemptLogger = Arc<dyn AttemptLogger>;

/// Emits each record as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAttemptLogger;

impl AttemptLogger for TracingAttemptLogger {
    fn log_attempt(&self, record: AttemptRecord) {
        let duration_ms = record.duration.as_millis() as u64;
        match record.status {
            AttemptStatus::Success => info!(
                operation = %record.operation,
                attempt = record.attempt,
                duration_ms,
                "Upstream call succeeded"
            ),
            status => warn!(
                operation = %record.operation,
                attempt = record.attempt,
                %status,
                duration_ms,
                error = record.error.as_deref().unwrap_or(""),
                metadata = ?record.metadata,
                "Upstream call failed"
            ),
        }
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAttemptLogger;

impl AttemptLogger for NoOpAttemptLogger {
    fn log_attempt(&self, _record: AttemptRecord) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Keeps records in memory, in arrival order
#[derive(Debug, Clone, Default)]
pub struct MemoryAttemptLogger {
    records: Arc<parking_lot::Mutex<Vec<AttemptRecord>>>,
}

impl MemoryAttemptLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record logged so far
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().clone()
    }

    /// Number of records with `status`
    pub fn count(&self, status: AttemptStatus) -> usize {
        self.records.lock().iter().filter(|r| r.status == status).count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AttemptLogger for MemoryAttemptLogger {
    fn log_attempt(&self, record: AttemptRecord) {
        self.records.lock().push(record);
    }
}
