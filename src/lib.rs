//! # QueryGuard
//!
//! A guarded query-execution skill engine. Free-form textual input is run
//! through a fixed sequence of security and resource checks, fingerprinted
//! by structure to select a canned query template, executed against a
//! relational backend under a configurable isolation strategy, and returned
//! as an opaque, checksummed result - with outcomes cached and an audit
//! trail emitted throughout. The point of the design is that an automated
//! caller can never cause unsafe or resource-unbounded database access.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Input Text
//!     ↓
//! [Query Cache]            → hit short-circuits everything below
//!     ↓
//! [Guard Pipeline]         → L1 entropy, L2 permission, L3 keywords,
//!     ↓                      L4 resources, L5 deadline (short-circuit)
//! [Semantic Topology]      → weighted token tree → 8-byte fingerprint
//!     ↓
//! [Schema Evolver]         → fingerprint → query template (bounded registry)
//!     ↓
//! [Isolated Execution]     → none | basic | full (worker + timeout race)
//!     ↓
//! [Row Decoding]           → typed values from backend column metadata
//!     ↓
//! [Result Encoding]        → obfuscation + checksum (+ zlib)
//!     ↓
//! SkillResult (success | rejected | error)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use queryguard::{Config, ExecutionBudget, MemoryBackend, QueryGuardSkill, Skill};
//! use std::sync::Arc;
//!
//! let config = Arc::new(Config::load()?);
//! let backend = Arc::new(MemoryBackend::new());
//! let skill = QueryGuardSkill::new(config, backend);
//!
//! let budget = ExecutionBudget::unbounded();
//! let result = skill.execute(&budget, "sales by region for 2025")?;
//! println!("{}: {} bytes", result.status, result.result.len());
//!
//! skill.safe_shutdown()?;
//! ```

pub mod audit;
pub mod backend;
pub mod budget;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod evolver;
pub mod guard;
pub mod isolation;
pub mod skill;
pub mod topology;

pub use audit::{AuditEntry, AuditLogger};
pub use backend::{BackendError, Column, MemoryBackend, QueryBackend, RowSet, SqlValue};
pub use budget::{BudgetError, ExecutionBudget};
pub use cache::QueryCache;
pub use config::{Config, ConfigError};
pub use engine::QueryGuardSkill;
pub use evolver::SchemaEvolver;
pub use guard::{GuardStage, GuardSystem, GuardVerdict};
pub use isolation::{IsolationError, IsolationLevel};
pub use skill::{Skill, SkillError, SkillResult, SkillStatus};
pub use topology::{Fingerprint, SemanticNode, SemanticTopology};
