//! Query deadlines and cooperative cancellation.
//!
//! Every query carries a [`QueryDeadline`]; the processor checks it between
//! pipeline stages so an expired or cancelled query stops doing work at the
//! next stage boundary. The cancellation flag is shared with the MCP
//! front-end, which flips it on `notifications/cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{QueryError, Result};

/// Default per-query deadline.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared flag the front-end flips when the client cancels a request.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Deadline plus cancellation, checked at stage boundaries.
#[derive(Debug, Clone)]
pub struct QueryDeadline {
    deadline: Instant,
    cancel: CancellationFlag,
}

impl QueryDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(timeout: Duration, cancel: CancellationFlag) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    /// The flag the front-end holds to cancel this query.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Err with `Cancelled` or `DeadlineExceeded` once either condition holds.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(QueryError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Time left before expiry (zero when past due).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Default for QueryDeadline {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}
