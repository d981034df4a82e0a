//! Execution Controller
//!
//! Derives bounded execution budgets from the configured timeout and
//! performs the coarse resource-cost checks behind the L4 guard stage.

use crate::budget::ExecutionBudget;
use crate::config::{parse_duration, Config};
use crate::isolation::IsolationLevel;
use std::sync::Arc;
use std::time::Duration;

/// Fallback when `execution.timeout.total` is missing or unparsable
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard ceiling on accepted input, independent of configuration
pub const MAX_INPUT_BYTES: usize = 10_240;

/// Derives execution budgets and enforces resource ceilings
#[derive(Clone)]
pub struct ExecutionController {
    config: Arc<Config>,
}

impl ExecutionController {
    pub fn new(config: Arc<Config>) -> Self {
        ExecutionController { config }
    }

    /// The configured total timeout, or the 10s default when unparsable
    pub fn total_timeout(&self) -> Duration {
        parse_duration(&self.config.execution.timeout.total).unwrap_or(DEFAULT_TOTAL_TIMEOUT)
    }

    /// Derive a child budget bounded by the total execution timeout
    pub fn execution_budget(&self, parent: &ExecutionBudget) -> ExecutionBudget {
        parent.child(self.total_timeout())
    }

    /// Coarse resource check: input size, estimated rows, estimated memory
    pub fn check_resource_limits(
        &self,
        input_size: usize,
        estimated_rows: usize,
        estimated_memory_mb: f64,
    ) -> bool {
        let limits = &self.config.security.resource_limits;
        input_size <= MAX_INPUT_BYTES
            && estimated_rows <= limits.max_rows
            && estimated_memory_mb <= limits.max_memory_mb as f64
    }

    /// Configured isolation strategy
    pub fn isolation_level(&self) -> IsolationLevel {
        IsolationLevel::parse(&self.config.execution.isolation_level)
    }
}
