//! Execution Budget
//!
//! A request-scoped deadline plus a cooperative cancellation flag, shared
//! across threads. The budget plays the role of a cancellable context: the
//! guard pipeline inspects its remaining time, backends poll it while
//! producing rows, and the full-isolation race watches it alongside the
//! worker and the configured timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Budget exhaustion error
#[derive(Debug, Clone, thiserror::Error)]
pub enum BudgetError {
    /// The budget's deadline has passed
    #[error("execution deadline exceeded")]
    DeadlineExceeded,

    /// The budget was cancelled by its owner
    #[error("execution cancelled")]
    Cancelled,
}

/// A deadline-bounded, cancellable execution budget
///
/// Cloning shares the cancellation flag; cancelling any clone cancels all
/// of them. Deriving a child budget tightens the deadline but keeps the
/// shared flag, so parent cancellation propagates into derived work.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionBudget {
    /// A budget with no deadline
    pub fn unbounded() -> Self {
        ExecutionBudget {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A fresh budget expiring after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        ExecutionBudget {
            deadline: Some(Instant::now() + timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derive a child budget capped by `timeout`, never looser than the parent
    pub fn child(&self, timeout: Duration) -> Self {
        let child_deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => Some(parent.min(child_deadline)),
            None => Some(child_deadline),
        };
        ExecutionBudget {
            deadline,
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// The absolute deadline, if one is set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this budget and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the budget was explicitly cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }

    /// Cooperative check; call periodically from long-running work
    pub fn check(&self) -> Result<(), BudgetError> {
        if self.is_cancelled() {
            return Err(BudgetError::Cancelled);
        }
        if self.is_expired() {
            return Err(BudgetError::DeadlineExceeded);
        }
        Ok(())
    }
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        ExecutionBudget::unbounded()
    }
}
