//! Schema Evolver
//!
//! A bounded, self-evicting registry mapping topology fingerprints to query
//! templates. Template lookup takes a shared lock; registration takes an
//! exclusive lock. When the registry is full, the entry with the lowest
//! usage count is evicted, ties broken by lowest pattern ID so eviction is
//! deterministic within a run.

use crate::config::Config;
use crate::topology::Fingerprint;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Template served for fingerprints that were never registered
pub const FALLBACK_TEMPLATE: &str = "SELECT * FROM data WHERE 1=1";

const TEMPLATES: [&str; 3] = [
    "SELECT name FROM customers c JOIN sales s ON c.id = s.customer_id \
     WHERE s.region = ? AND s.year = ? AND s.amount > ?",
    "SELECT region, SUM(amount) as total FROM sales WHERE year = ? GROUP BY region",
    "SELECT name, amount FROM customers c JOIN sales s ON c.id = s.customer_id \
     WHERE s.year = ? ORDER BY s.amount DESC LIMIT ?",
];

struct EvolverState {
    /// fingerprint → pattern ID
    mappings: HashMap<Fingerprint, u32>,
    /// pattern ID → usage count; bumped through the shared lock
    counters: HashMap<u32, AtomicU64>,
    next_pattern_id: u32,
}

/// Bounded fingerprint → template registry
pub struct SchemaEvolver {
    state: RwLock<EvolverState>,
    max_patterns: usize,
}

impl SchemaEvolver {
    pub fn new(config: Arc<Config>) -> Self {
        SchemaEvolver {
            state: RwLock::new(EvolverState {
                mappings: HashMap::new(),
                counters: HashMap::new(),
                next_pattern_id: 0,
            }),
            max_patterns: config.evolution.max_patterns,
        }
    }

    /// Resolve the template for a fingerprint, bumping its usage count;
    /// unknown fingerprints get the generic fallback
    pub fn get_query_template(&self, fingerprint: &Fingerprint) -> String {
        let state = self.state.read();
        if let Some(&pattern_id) = state.mappings.get(fingerprint) {
            if let Some(count) = state.counters.get(&pattern_id) {
                count.fetch_add(1, Ordering::Relaxed);
            }
            return template_for(pattern_id);
        }
        FALLBACK_TEMPLATE.to_string()
    }

    /// Register a fingerprint, assigning the next pattern ID
    ///
    /// Idempotent for known fingerprints. At capacity, the least-used
    /// pattern (lowest ID on ties) is evicted first.
    pub fn register_new_pattern(&self, fingerprint: &Fingerprint) {
        let mut state = self.state.write();
        if state.mappings.contains_key(fingerprint) {
            return;
        }

        if state.mappings.len() >= self.max_patterns {
            evict_least_used(&mut state);
        }

        state.next_pattern_id += 1;
        let pattern_id = state.next_pattern_id;
        state.mappings.insert(*fingerprint, pattern_id);
        state.counters.insert(pattern_id, AtomicU64::new(1));
        debug!(pattern_id, "registered new query pattern");
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.state.read().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_least_used(state: &mut EvolverState) {
    let victim = state
        .counters
        .iter()
        .map(|(&id, count)| (count.load(Ordering::Relaxed), id))
        .min();

    if let Some((count, victim_id)) = victim {
        state.mappings.retain(|_, id| *id != victim_id);
        state.counters.remove(&victim_id);
        debug!(pattern_id = victim_id, usage = count, "evicted least-used pattern");
    }
}

fn template_for(pattern_id: u32) -> String {
    TEMPLATES[(pattern_id % 3) as usize].to_string()
}
