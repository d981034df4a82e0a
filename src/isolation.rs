//! Execution Isolation Strategies
//!
//! Controls how defensively a query template is run against the backend:
//!
//! - `none` - direct call on the caller's budget.
//! - `basic` - direct call, then truncate the row set to the row limit
//!   before handing it back (a bounded-read safeguard, not isolation).
//! - `full` - the call runs on a separate worker thread; panics are
//!   recovered into errors, and the caller races worker completion
//!   against budget cancellation and the configured total timeout.
//!   An abandoned worker finishes on its own and its result is discarded.

use crate::backend::{BackendError, QueryBackend, RowSet};
use crate::budget::ExecutionBudget;
use crossbeam_channel::bounded;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// How often the full-isolation race polls for cancellation
const RACE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execution failure surfaced to the orchestrator
#[derive(Debug, Clone, thiserror::Error)]
pub enum IsolationError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The isolated worker panicked; the panic was recovered
    #[error("execution panic: {0}")]
    Panic(String),

    /// The configured total timeout fired before the worker finished
    #[error("execution timeout after {0:?}")]
    Timeout(Duration),

    /// The caller's budget was cancelled or expired during the race
    #[error("execution cancelled: {0}")]
    Cancelled(String),
}

/// Execution strategy, parsed from `execution.isolation_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    None,
    Basic,
    Full,
}

impl IsolationLevel {
    /// Unknown values run without isolation, matching the permissive
    /// default of the configuration surface
    pub fn parse(s: &str) -> IsolationLevel {
        match s {
            "basic" => IsolationLevel::Basic,
            "full" => IsolationLevel::Full,
            _ => IsolationLevel::None,
        }
    }
}

/// Run one template under the selected isolation strategy
pub fn execute_with_isolation(
    level: IsolationLevel,
    backend: &Arc<dyn QueryBackend>,
    template: &str,
    budget: &ExecutionBudget,
    total_timeout: Duration,
    max_rows: usize,
) -> Result<RowSet, IsolationError> {
    match level {
        IsolationLevel::None => Ok(backend.run_query(template, budget)?),
        IsolationLevel::Basic => {
            let mut row_set = backend.run_query(template, budget)?;
            // Bounded read: never hand more rows upward than the limit
            row_set.rows.truncate(max_rows);
            Ok(row_set)
        }
        IsolationLevel::Full => execute_full(backend, template, budget, total_timeout),
    }
}

fn execute_full(
    backend: &Arc<dyn QueryBackend>,
    template: &str,
    budget: &ExecutionBudget,
    total_timeout: Duration,
) -> Result<RowSet, IsolationError> {
    let (tx, rx) = bounded::<Result<RowSet, IsolationError>>(1);
    let worker_backend = Arc::clone(backend);
    let worker_template = template.to_string();
    let worker_budget = budget.clone();

    let spawned = thread::Builder::new()
        .name("isolated-query".to_string())
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                worker_backend.run_query(&worker_template, &worker_budget)
            }));
            let result = match outcome {
                Ok(Ok(rows)) => Ok(rows),
                Ok(Err(e)) => Err(IsolationError::Backend(e)),
                Err(panic) => Err(IsolationError::Panic(panic_message(panic))),
            };
            // The caller may already have returned; a failed send just
            // discards the late result.
            let _ = tx.send(result);
        });

    if let Err(e) = spawned {
        warn!(error = %e, "failed to spawn isolated query worker");
        return Err(IsolationError::Cancelled("worker spawn failed".to_string()));
    }

    let timeout_at = Instant::now() + total_timeout;
    loop {
        crossbeam_channel::select! {
            recv(rx) -> msg => {
                return msg.unwrap_or_else(|_| {
                    Err(IsolationError::Cancelled("worker vanished".to_string()))
                });
            }
            default(RACE_POLL_INTERVAL) => {
                if let Err(cause) = budget.check() {
                    return Err(IsolationError::Cancelled(cause.to_string()));
                }
                if Instant::now() >= timeout_at {
                    return Err(IsolationError::Timeout(total_timeout));
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Column, MemoryBackend};

    struct PanickingBackend;

    impl QueryBackend for PanickingBackend {
        fn run_query(&self, _: &str, _: &ExecutionBudget) -> Result<RowSet, BackendError> {
            panic!("driver exploded");
        }
        fn close(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct SlowBackend {
        delay: Duration,
    }

    impl QueryBackend for SlowBackend {
        fn run_query(&self, _: &str, _: &ExecutionBudget) -> Result<RowSet, BackendError> {
            thread::sleep(self.delay);
            Ok(RowSet::default())
        }
        fn close(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn memory() -> Arc<dyn QueryBackend> {
        Arc::new(MemoryBackend::new())
    }

    #[test]
    fn parse_maps_unknown_levels_to_none() {
        assert_eq!(IsolationLevel::parse("none"), IsolationLevel::None);
        assert_eq!(IsolationLevel::parse("basic"), IsolationLevel::Basic);
        assert_eq!(IsolationLevel::parse("full"), IsolationLevel::Full);
        assert_eq!(IsolationLevel::parse("paranoid"), IsolationLevel::None);
    }

    #[test]
    fn basic_isolation_truncates_rows() {
        let backend = memory();
        let rows = execute_with_isolation(
            IsolationLevel::Basic,
            &backend,
            "SELECT ...",
            &ExecutionBudget::unbounded(),
            Duration::from_secs(1),
            2,
        )
        .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn none_isolation_returns_all_rows() {
        let backend = memory();
        let rows = execute_with_isolation(
            IsolationLevel::None,
            &backend,
            "SELECT ...",
            &ExecutionBudget::unbounded(),
            Duration::from_secs(1),
            2,
        )
        .unwrap();
        assert_eq!(rows.rows.len(), 4);
    }

    #[test]
    fn full_isolation_recovers_worker_panic() {
        let backend: Arc<dyn QueryBackend> = Arc::new(PanickingBackend);
        let err = execute_with_isolation(
            IsolationLevel::Full,
            &backend,
            "SELECT ...",
            &ExecutionBudget::unbounded(),
            Duration::from_secs(1),
            10,
        )
        .unwrap_err();
        match err {
            IsolationError::Panic(msg) => assert!(msg.contains("driver exploded")),
            other => panic!("expected panic recovery, got {other:?}"),
        }
    }

    #[test]
    fn full_isolation_times_out_slow_workers() {
        let backend: Arc<dyn QueryBackend> = Arc::new(SlowBackend {
            delay: Duration::from_millis(500),
        });
        let started = Instant::now();
        let err = execute_with_isolation(
            IsolationLevel::Full,
            &backend,
            "SELECT ...",
            &ExecutionBudget::unbounded(),
            Duration::from_millis(50),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, IsolationError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(400), "race returned early");
    }

    #[test]
    fn full_isolation_observes_budget_cancellation() {
        let backend: Arc<dyn QueryBackend> = Arc::new(SlowBackend {
            delay: Duration::from_millis(500),
        });
        let budget = ExecutionBudget::unbounded();
        let handle = {
            let budget = budget.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                budget.cancel();
            })
        };
        let err = execute_with_isolation(
            IsolationLevel::Full,
            &backend,
            "SELECT ...",
            &budget,
            Duration::from_secs(5),
            10,
        )
        .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, IsolationError::Cancelled(_)));
    }

    #[test]
    fn full_isolation_returns_fast_worker_results() {
        let backend: Arc<dyn QueryBackend> = Arc::new(MemoryBackend::with_rows(
            vec![Column::new("n", "INT")],
            vec![vec!["7".to_string()]],
        ));
        let rows = execute_with_isolation(
            IsolationLevel::Full,
            &backend,
            "SELECT ...",
            &ExecutionBudget::unbounded(),
            Duration::from_secs(1),
            10,
        )
        .unwrap();
        assert_eq!(rows.rows.len(), 1);
    }
}
