//! Guard System
//!
//! The single authorization decision point: a fixed, ordered, five-stage
//! pipeline that short-circuits on the first failing stage.
//!
//! | Stage | Check |
//! |-------|-------|
//! | L1    | Semantic safety (character entropy bounds) |
//! | L2    | Operation permission for the detected operation |
//! | L3    | Forbidden-keyword filter |
//! | L4    | Resource control (size / row / memory estimates) |
//! | L5    | Execution safety (remaining deadline budget) |
//!
//! No stage may be skipped or reordered; a rejection reason always names
//! the failing stage.

mod execution;
mod permission;

pub use execution::{ExecutionController, DEFAULT_TOTAL_TIMEOUT, MAX_INPUT_BYTES};
pub use permission::{calculate_entropy, PermissionController};

use crate::budget::ExecutionBudget;
use crate::config::Config;
use std::fmt;
use std::sync::Arc;

/// One ordered stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    L1SemanticSafety,
    L2OperationPermission,
    L3KeywordFilter,
    L4ResourceControl,
    L5ExecutionSafety,
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardStage::L1SemanticSafety => write!(f, "L1"),
            GuardStage::L2OperationPermission => write!(f, "L2"),
            GuardStage::L3KeywordFilter => write!(f, "L3"),
            GuardStage::L4ResourceControl => write!(f, "L4"),
            GuardStage::L5ExecutionSafety => write!(f, "L5"),
        }
    }
}

/// Outcome of running the full pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// All five stages passed
    Allowed,
    /// A stage failed; later stages were not evaluated
    Rejected { stage: GuardStage, reason: String },
}

impl GuardVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allowed)
    }

    /// The rejection reason, or an empty string when allowed
    pub fn reason(&self) -> &str {
        match self {
            GuardVerdict::Allowed => "",
            GuardVerdict::Rejected { reason, .. } => reason,
        }
    }
}

/// The five-stage, short-circuiting guard pipeline
pub struct GuardSystem {
    config: Arc<Config>,
    permission: PermissionController,
    execution: ExecutionController,
}

impl GuardSystem {
    pub fn new(
        config: Arc<Config>,
        permission: PermissionController,
        execution: ExecutionController,
    ) -> Self {
        GuardSystem {
            config,
            permission,
            execution,
        }
    }

    /// Run all five stages in order, stopping at the first failure
    pub fn check_all_guards(&self, budget: &ExecutionBudget, input: &str) -> GuardVerdict {
        // L1: semantic safety
        if !self.permission.check_semantic_safety(input) {
            return reject(
                GuardStage::L1SemanticSafety,
                "L1: semantic safety violation - entropy out of configured range",
            );
        }

        // L2: operation permission
        let operation = self.detect_operation(input);
        if !self.permission.check_operation_permission(&operation) {
            return reject(
                GuardStage::L2OperationPermission,
                &format!("L2: operation '{operation}' not allowed in current execution mode"),
            );
        }

        // L3: keyword filter
        if let Some(keyword) = self.permission.check_forbidden_keywords(input) {
            return reject(
                GuardStage::L3KeywordFilter,
                &format!("L3: forbidden keyword detected: {keyword}"),
            );
        }

        // L4: resource control
        if !self.check_resource_limits(input) {
            return reject(GuardStage::L4ResourceControl, "L4: resource limits exceeded");
        }

        // L5: execution safety
        if let Err(cause) = self.check_execution_safety(budget) {
            return reject(GuardStage::L5ExecutionSafety, &format!("L5: {cause}"));
        }

        GuardVerdict::Allowed
    }

    /// First allowed operation found as a case-insensitive substring;
    /// defaults to SELECT when none is present
    fn detect_operation(&self, input: &str) -> String {
        let lower_input = input.to_lowercase();
        self.config
            .security
            .allowed_operations
            .iter()
            .find(|op| lower_input.contains(&op.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| "SELECT".to_string())
    }

    fn check_resource_limits(&self, input: &str) -> bool {
        let input_size = input.len();
        let estimated_rows = input_size / 100;
        let estimated_memory_mb = input_size as f64 / 1_048_576.0;
        self.execution
            .check_resource_limits(input_size, estimated_rows, estimated_memory_mb)
    }

    /// A deadline-carrying budget must retain at least half the configured
    /// total timeout; an unbounded budget passes
    fn check_execution_safety(&self, budget: &ExecutionBudget) -> Result<(), String> {
        if budget.is_cancelled() {
            return Err("request cancelled".to_string());
        }
        if let Some(remaining) = budget.remaining() {
            let min_required = self.execution.total_timeout() / 2;
            if remaining < min_required {
                return Err("deadline exceeded".to_string());
            }
        }
        Ok(())
    }
}

fn reject(stage: GuardStage, reason: &str) -> GuardVerdict {
    GuardVerdict::Rejected {
        stage,
        reason: reason.to_string(),
    }
}
