//! Retry orchestration under the circuit breaker and per-category policy
//!
//! Each attempt runs `check_state → invoke → categorize → record → sleep`:
//!
//! 1. The breaker gates the attempt. A rejection surfaces immediately as
//!    `SERVICE_UNAVAILABLE` and is not counted as a failure of the operation.
//! 2. Success is recorded on the breaker and returned.
//! 3. A failure is categorized (unless the operation already returned a
//!    [`CategorizedError`]), recorded on the breaker and appended to the
//!    call's retry history.
//! 4. While `should_retry && attempt < max_retries`, the loop sleeps for the
//!    decision's delay and tries again; otherwise the error is returned
//!    carrying the full history.
//!
//! Every attempt, including breaker rejections, is reported to the
//! [`AttemptLogger`](crate::observability::AttemptLogger) with its error text
//! passed through the [`Redactor`](crate::privacy::Redactor).

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, ConfigResult,
};
use crate::categorizer::ErrorCategorizer;
use crate::error::{
    CategorizedError, ErrorContext, FailureKind, OperationFailure, RetryAttempt, RetryDecision,
};
use crate::observability::{
    AttemptRecord, AttemptStatus, SharedAttemptLogger, TracingAttemptLogger,
};
use crate::privacy::{SecretRedactor, SharedRedactor};
use crate::time::{SharedClock, SystemClock};

/// Operation name used in attempt records when no context was supplied
const ANONYMOUS_OPERATION: &str = "anonymous";

/// Terminal outcome of a cancellable retry loop
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// The operation failed and will not be retried
    #[error(transparent)]
    Failed(#[from] CategorizedError),

    /// The caller cancelled while an attempt or backoff was pending
    #[error("Operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32, history: Vec<RetryAttempt> },
}

impl RetryError {
    /// Whether the loop stopped because of cancellation
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Failed attempts observed before the loop stopped
    pub fn history(&self) -> &[RetryAttempt] {
        match self {
            Self::Failed(error) => &error.retry_history,
            Self::Cancelled { history, .. } => history,
        }
    }
}

impl From<RetryError> for CategorizedError {
    fn from(error: RetryError) -> Self {
        match error {
            RetryError::Failed(error) => error,
            RetryError::Cancelled { attempts, history } => {
                let mut error = CategorizedError::unknown(
                    None,
                    format!("Operation cancelled after {attempts} attempt(s)"),
                    attempts,
                )
                .with_history(history);
                error.retry_decision = RetryDecision::stop(attempts);
                error
            }
        }
    }
}

/// Drives caller-supplied operations through the breaker and retry policy
///
/// One orchestrator (and its breaker) is meant to live as long as the client
/// that owns it; clones share the breaker.
#[derive(Clone)]
pub struct RetryOrchestrator {
    categorizer: ErrorCategorizer,
    breaker: Arc<CircuitBreaker>,
    logger: SharedAttemptLogger,
    redactor: SharedRedactor,
    clock: SharedClock,
}

impl fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("breaker", &self.breaker)
            .field("logger", &self.logger)
            .field("redactor", &self.redactor)
            .finish_non_exhaustive()
    }
}

impl Default for RetryOrchestrator {
    fn default() -> Self {
        Self::with_breaker(
            SystemClock::shared(),
            Arc::new(CircuitBreaker::default()),
            Arc::new(TracingAttemptLogger),
            SecretRedactor::shared(),
        )
    }
}

impl RetryOrchestrator {
    /// Create a builder
    pub fn builder() -> RetryOrchestratorBuilder {
        RetryOrchestratorBuilder::default()
    }

    fn with_breaker(
        clock: SharedClock,
        breaker: Arc<CircuitBreaker>,
        logger: SharedAttemptLogger,
        redactor: SharedRedactor,
    ) -> Self {
        Self { categorizer: ErrorCategorizer::new(clock.clone()), breaker, logger, redactor, clock }
    }

    /// Shared breaker handle
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Snapshot of the breaker
    pub fn circuit_breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    /// Categorizer used for raw faults
    pub fn categorizer(&self) -> &ErrorCategorizer {
        &self.categorizer
    }

    /// Collaborator receiving every attempt
    pub fn attempt_logger(&self) -> &SharedAttemptLogger {
        &self.logger
    }

    /// Scrubber applied to error text before it is logged
    pub fn redactor(&self) -> &SharedRedactor {
        &self.redactor
    }

    /// Run `operation` until it succeeds or its failure is not retryable
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        context: Option<ErrorContext>,
    ) -> Result<T, CategorizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationFailure>,
    {
        self.run(operation, context, None).await.map_err(CategorizedError::from)
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), but `cancel`
    /// aborts a pending attempt or backoff sleep promptly
    pub async fn execute_with_cancellation<F, Fut, T, E>(
        &self,
        operation: F,
        context: Option<ErrorContext>,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationFailure>,
    {
        self.run(operation, context, Some(cancel)).await
    }

    #[instrument(
        name = "retry",
        skip_all,
        fields(operation = context.as_ref().map_or(ANONYMOUS_OPERATION, |c| c.operation.as_str()))
    )]
    async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
        context: Option<ErrorContext>,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationFailure>,
    {
        let mut attempt: u32 = 0;
        let mut history: Vec<RetryAttempt> = Vec::new();

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(RetryError::Cancelled { attempts: attempt, history });
            }

            if let Err(rejection) = self.breaker.check_state(context.as_ref()) {
                let status = AttemptStatus::Rejected;
                self.report(&context, attempt, status, Duration::ZERO, Some(&rejection));
                return Err(RetryError::Failed(rejection.with_history(history)));
            }

            debug!(attempt, "Executing operation");
            let started = Instant::now();
            let Some(outcome) = cancellable(cancel, operation()).await else {
                return Err(RetryError::Cancelled { attempts: attempt + 1, history });
            };
            let elapsed = started.elapsed();

            let failure = match outcome {
                Ok(value) => {
                    self.breaker.record_success();
                    self.report(&context, attempt, AttemptStatus::Success, elapsed, None);
                    if attempt > 0 {
                        info!(retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(failure) => failure.into(),
            };

            let mut error = match failure {
                OperationFailure::Categorized(error) => error,
                OperationFailure::Fault(fault) => {
                    self.categorizer.categorize(&fault, attempt, context.clone())
                }
            };
            if error.context.is_none() {
                error.context = context.clone();
            }

            self.breaker.record_failure();
            history.push(RetryAttempt {
                attempt,
                timestamp: DateTime::<Utc>::from(self.clock.system_time()),
                error: error.technical_message.clone(),
            });
            self.report(&context, attempt, AttemptStatus::Failure, elapsed, Some(&error));

            let decision = &error.retry_decision;
            if !(decision.should_retry && attempt < decision.max_retries) {
                warn!(
                    category = %error.category(),
                    attempts = attempt + 1,
                    "Giving up on operation"
                );
                return Err(RetryError::Failed(error.with_history(history)));
            }

            let delay = decision.delay;
            warn!(
                category = %error.category(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Operation failed, retrying"
            );
            if cancellable(cancel, tokio::time::sleep(delay)).await.is_none() {
                return Err(RetryError::Cancelled { attempts: attempt + 1, history });
            }
            attempt += 1;
        }
    }

    fn report(
        &self,
        context: &Option<ErrorContext>,
        attempt: u32,
        status: AttemptStatus,
        duration: Duration,
        error: Option<&CategorizedError>,
    ) {
        if !self.logger.is_enabled() {
            return;
        }

        let mut metadata: BTreeMap<String, String> = context
            .as_ref()
            .map(|c| {
                c.metadata.iter().map(|(k, v)| (k.clone(), self.redactor.redact(v))).collect()
            })
            .unwrap_or_default();
        if let Some(error) = error {
            metadata.insert("category".to_string(), error.category().to_string());
            if let Some(status) = error.status_code {
                metadata.insert("status_code".to_string(), status.to_string());
            }
            if let FailureKind::RateLimit { reset_at_secs } = error.kind {
                metadata.insert("rate_limit_reset".to_string(), reset_at_secs.to_string());
            }
        }
        if let Some(resource) = context.as_ref().and_then(|c| c.resource.as_deref()) {
            metadata.insert("resource".to_string(), self.redactor.redact(resource));
        }

        self.logger.log_attempt(AttemptRecord {
            operation: context
                .as_ref()
                .map_or_else(|| ANONYMOUS_OPERATION.to_string(), |c| c.operation.clone()),
            attempt,
            status,
            duration,
            error: error.map(|e| self.redactor.redact(&e.technical_message)),
            metadata: (!metadata.is_empty()).then_some(metadata),
        });
    }
}

/// Resolve `future`, or `None` if `cancel` fires first
async fn cancellable<F: Future>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

/// Builder for [`RetryOrchestrator`]
#[derive(Default)]
pub struct RetryOrchestratorBuilder {
    clock: Option<SharedClock>,
    breaker: Option<Arc<CircuitBreaker>>,
    breaker_config: Option<CircuitBreakerConfig>,
    logger: Option<SharedAttemptLogger>,
    redactor: Option<SharedRedactor>,
}

impl RetryOrchestratorBuilder {
    /// Clock for the categorizer, the breaker and history timestamps
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing breaker instead of creating one
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Configuration for a breaker created by [`build`](Self::build)
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = Some(config);
        self
    }

    pub fn attempt_logger(mut self, logger: SharedAttemptLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn redactor(mut self, redactor: SharedRedactor) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Build, validating the breaker configuration when one is created
    pub fn build(self) -> ConfigResult<RetryOrchestrator> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let breaker = match self.breaker {
            Some(breaker) => breaker,
            None => {
                let config = self.breaker_config.unwrap_or_default();
                config.validate()?;
                Arc::new(CircuitBreaker::with_clock(config, clock.clone()))
            }
        };
        Ok(RetryOrchestrator::with_breaker(
            clock,
            breaker,
            self.logger.unwrap_or_else(|| Arc::new(TracingAttemptLogger)),
            self.redactor.unwrap_or_else(SecretRedactor::shared),
        ))
    }
}
