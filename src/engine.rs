//! Query Guard Engine
//!
//! The per-request orchestrator behind the [`Skill`] contract. One
//! execution flows cache lookup → guard pipeline → topology fingerprint →
//! template selection → isolated execution → row decoding → result
//! encoding → cache write, with audit events emitted along the way.
//!
//! Rejections and execution failures are results, not errors; the only
//! `Err` this engine produces is "skill is closed".

use crate::audit::AuditLogger;
use crate::backend::{decode_rows, QueryBackend};
use crate::budget::ExecutionBudget;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::encoding::encode_rows;
use crate::evolver::SchemaEvolver;
use crate::guard::{ExecutionController, GuardSystem, GuardVerdict, PermissionController};
use crate::skill::{Skill, SkillError, SkillResult, SkillStatus};
use crate::topology::SemanticTopology;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// The guarded query-execution skill
pub struct QueryGuardSkill {
    config: Arc<Config>,
    backend: Arc<dyn QueryBackend>,
    guard: GuardSystem,
    execution: ExecutionController,
    topology: SemanticTopology,
    evolver: SchemaEvolver,
    cache: QueryCache,
    audit: AuditLogger,
    closed: Mutex<bool>,
}

impl QueryGuardSkill {
    pub fn new(config: Arc<Config>, backend: Arc<dyn QueryBackend>) -> Self {
        let permission = PermissionController::new(Arc::clone(&config));
        let execution = ExecutionController::new(Arc::clone(&config));
        let guard = GuardSystem::new(Arc::clone(&config), permission, execution.clone());

        QueryGuardSkill {
            guard,
            execution,
            topology: SemanticTopology::new(),
            evolver: SchemaEvolver::new(Arc::clone(&config)),
            cache: QueryCache::new(Arc::clone(&config)),
            audit: AuditLogger::new(Arc::clone(&config)),
            backend,
            config,
            closed: Mutex::new(false),
        }
    }

    fn execute_pipeline(
        &self,
        budget: &ExecutionBudget,
        input: &str,
        query_id: &str,
        started: Instant,
    ) -> SkillResult {
        // Cache hit bypasses all guard and execution work
        if self.config.cache.enabled {
            if let Some(result) = self.cache.get(input) {
                self.audit
                    .log_event(query_id, "cache_hit", json!({ "input": input }));
                return result;
            }
        }

        // The single authorization decision point
        let verdict = self.guard.check_all_guards(budget, input);
        if let GuardVerdict::Rejected { stage, reason } = verdict {
            info!(%stage, reason = %reason, "input rejected by guard pipeline");
            self.audit.log_event(
                query_id,
                "rejected",
                json!({ "input": input, "reason": &reason }),
            );
            return self.result(query_id, SkillStatus::Rejected, Vec::new(), reason.into_bytes());
        }

        let Some(topology) = self.topology.build_topology(input) else {
            self.audit
                .log_event(query_id, "topology_error", json!({ "input": input }));
            return self.result(
                query_id,
                SkillStatus::Error,
                Vec::new(),
                b"topology_build_failed".to_vec(),
            );
        };
        debug!(
            balance = self.topology.topology_balance(&topology),
            "topology built"
        );

        let fingerprint = self.topology.topology_fingerprint(&topology);
        self.evolver.register_new_pattern(&fingerprint);
        let template = self.evolver.get_query_template(&fingerprint);

        let exec_budget = self.execution.execution_budget(budget);
        let max_rows = self.config.security.resource_limits.max_rows;
        let executed = crate::isolation::execute_with_isolation(
            self.execution.isolation_level(),
            &self.backend,
            &template,
            &exec_budget,
            self.execution.total_timeout(),
            max_rows,
        );

        let row_set = match executed {
            Ok(rows) => rows,
            Err(e) => {
                self.audit.log_event(
                    query_id,
                    "execution_error",
                    json!({
                        "input": input,
                        "error": e.to_string(),
                        "timeout": self.config.execution.timeout.total,
                    }),
                );
                let meta = format!("execution_failed: {e}").into_bytes();
                return self.result(query_id, SkillStatus::Error, Vec::new(), meta);
            }
        };

        let rows = decode_rows(&row_set, max_rows);
        let compress = self.config.performance.compression.enabled;
        let encoded = encode_rows(&rows, compress);
        let meta = json!({
            "input_length": input.len(),
            "template_used": template,
            "row_count": rows.len(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let meta = serde_json::to_vec(&meta).unwrap_or_default();

        let result = self.result(query_id, SkillStatus::Success, encoded, meta);

        if self.config.cache.enabled {
            self.cache.set(input, result.clone());
        }

        self.audit.log_event(
            query_id,
            "success",
            json!({
                "input": input,
                "template": template,
                "row_count": rows.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }),
        );

        result
    }

    fn result(
        &self,
        query_id: &str,
        status: SkillStatus,
        result: Vec<u8>,
        meta: Vec<u8>,
    ) -> SkillResult {
        SkillResult {
            query_id: query_id.to_string(),
            result,
            meta,
            timestamp: Utc::now(),
            status,
        }
    }
}

impl Skill for QueryGuardSkill {
    fn capability_id(&self) -> String {
        format!("{}-{}", self.config.app.name, self.config.app.version)
    }

    fn execute(&self, budget: &ExecutionBudget, input: &str) -> Result<SkillResult, SkillError> {
        {
            let closed = self.closed.lock();
            if *closed {
                return Err(SkillError::Closed);
            }
        }

        let query_id = Uuid::new_v4().simple().to_string();
        let started = Instant::now();

        self.audit
            .log_event(&query_id, "execution_start", json!({ "input": input }));

        let result = self.execute_pipeline(budget, input, &query_id, started);

        self.audit.log_event(
            &query_id,
            "execution_end",
            json!({ "duration_ms": started.elapsed().as_millis() as u64 }),
        );

        Ok(result)
    }

    fn safe_shutdown(&self) -> Result<(), SkillError> {
        let mut closed = self.closed.lock();
        if *closed {
            return Ok(());
        }
        *closed = true;

        info!("shutting down query guard skill");
        self.audit.close();
        self.backend.close()?;
        Ok(())
    }
}
