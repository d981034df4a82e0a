//! Skill Contract
//!
//! The externally exposed unit of functionality: a capability identifier,
//! an execute operation, and an idempotent shutdown. Hosts and protocol
//! adapters depend only on this trait, never on the engine's internals.
//!
//! Query-level outcomes (rejections, execution failures) are encoded in
//! [`SkillResult::status`]; an `Err` from [`Skill::execute`] means the skill
//! itself is unusable (it has been shut down).

use crate::backend::BackendError;
use crate::budget::ExecutionBudget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Infrastructure-level skill error
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// The skill has been shut down; no further requests are accepted
    #[error("skill is closed")]
    Closed,

    /// The backend handle failed to close during shutdown
    #[error("backend shutdown failed: {0}")]
    Shutdown(#[from] BackendError),
}

/// Outcome class of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    /// Query executed and produced an encoded result
    Success,
    /// The guard pipeline declined the input
    Rejected,
    /// Execution failed after passing the guards
    Error,
}

impl fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillStatus::Success => write!(f, "success"),
            SkillStatus::Rejected => write!(f, "rejected"),
            SkillStatus::Error => write!(f, "error"),
        }
    }
}

/// Immutable result of one execution, stored by value in the result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub query_id: String,

    /// Obfuscated (and possibly compressed) row encoding; empty unless
    /// the status is `Success`
    pub result: Vec<u8>,

    /// JSON metadata on success; the rejection or error cause otherwise
    pub meta: Vec<u8>,

    pub timestamp: DateTime<Utc>,
    pub status: SkillStatus,
}

/// The skill contract consumed by host callers
pub trait Skill: Send + Sync {
    /// Stable identifier combining the configured name and version
    fn capability_id(&self) -> String;

    /// Run one input through the full pipeline
    ///
    /// Rejections and execution failures come back as a normal
    /// [`SkillResult`]; only a closed skill yields `Err`.
    fn execute(&self, budget: &ExecutionBudget, input: &str) -> Result<SkillResult, SkillError>;

    /// Idempotent shutdown: closes the audit trail and the backend handle
    fn safe_shutdown(&self) -> Result<(), SkillError>;
}
