//! Connection pool capping concurrent in-flight calls
//!
//! Callers beyond `max_connections` queue in FIFO order on a fair tokio
//! semaphore. A slot is an RAII guard: dropping it (on success, failure or
//! panic) releases the slot and wakes the next queued caller.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a caller did not get a pool slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Timed out after {}ms waiting for a connection slot", waited.as_millis())]
    QueueTimeout { waited: Duration },

    #[error("Cancelled while waiting for a connection slot")]
    Cancelled,

    #[error("Connection pool is closed")]
    Closed,
}

/// Point-in-time pool snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPoolStatus {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub queued: usize,
}

/// FIFO-fair cap on concurrent calls
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    total: usize,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    queue_timeout: Option<Duration>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

impl ConnectionPool {
    /// Pool with `max_connections` slots; `queue_timeout` bounds the wait
    pub fn new(max_connections: usize, queue_timeout: Option<Duration>) -> Self {
        let total = max_connections.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(total)),
            total,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
            queue_timeout,
        }
    }

    /// Take a slot, queueing behind earlier callers when none is free
    ///
    /// # Errors
    /// [`PoolError::QueueTimeout`] once the configured wait bound elapses,
    /// [`PoolError::Cancelled`] when `cancel` fires first and
    /// [`PoolError::Closed`] after [`close`](Self::close).
    pub async fn acquire(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<PoolSlot, PoolError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(self.slot(permit));
        }
        if self.semaphore.is_closed() {
            return Err(PoolError::Closed);
        }

        let _queued = QueuedGuard::enter(&self.queued);
        debug!(status = ?self.status(), "All connection slots busy, queueing");

        let permit = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(PoolError::Cancelled),
                permit = self.wait_for_permit() => permit?,
            },
            None => self.wait_for_permit().await?,
        };
        Ok(self.slot(permit))
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        let wait = Arc::clone(&self.semaphore).acquire_owned();
        let acquired = match self.queue_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                warn!(waited_ms = limit.as_millis() as u64, "Connection slot wait timed out");
                PoolError::QueueTimeout { waited: limit }
            })?,
            None => wait.await,
        };
        acquired.map_err(|_| PoolError::Closed)
    }

    fn slot(&self, permit: OwnedSemaphorePermit) -> PoolSlot {
        self.active.fetch_add(1, Ordering::SeqCst);
        PoolSlot { active: Arc::clone(&self.active), _permit: permit }
    }

    /// Snapshot of `{total, active, idle, queued}`
    pub fn status(&self) -> ConnectionPoolStatus {
        let active = self.active.load(Ordering::SeqCst);
        ConnectionPoolStatus {
            total: self.total,
            active,
            idle: self.total.saturating_sub(active),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }

    /// Reject queued and future callers; slots already held stay valid
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Held pool slot; released on drop
#[must_use = "the slot is released as soon as it is dropped"]
pub struct PoolSlot {
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSlot").finish_non_exhaustive()
    }
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        // Runs before the permit field drops, so `active` never over-counts.
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct QueuedGuard<'a>(&'a AtomicUsize);

impl<'a> QueuedGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
