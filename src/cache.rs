//! Query Cache
//!
//! Maps raw input text to previously computed skill results. Bounded by a
//! configured capacity, entries expire after a TTL, and a background
//! sweeper removes expired entries on a fixed interval.
//!
//! ## Sweeper lifecycle
//!
//! The sweeper terminates itself once the cache becomes empty, and the next
//! write respawns it, so expiry keeps working across idle periods without a
//! permanently idle thread. Reads never serve an expired entry regardless
//! of sweeper state.

use crate::config::{parse_duration, Config};
use crate::skill::SkillResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// TTL applied when `cache.ttl` is missing or unparsable
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// How often the sweeper wakes
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    result: SkillResult,
    created_at: Instant,
}

/// Bounded, TTL-expiring result cache
pub struct QueryCache {
    enabled: bool,
    capacity: usize,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    sweeper_running: Arc<AtomicBool>,
    sweep_interval: Duration,
}

impl QueryCache {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_sweep_interval(config, SWEEP_INTERVAL)
    }

    /// Constructor with an explicit sweep interval, used by tests
    pub fn with_sweep_interval(config: Arc<Config>, sweep_interval: Duration) -> Self {
        let ttl = parse_duration(&config.cache.ttl).unwrap_or(DEFAULT_TTL);
        let cache = QueryCache {
            enabled: config.cache.enabled,
            capacity: config.cache.size,
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
            sweeper_running: Arc::new(AtomicBool::new(false)),
            sweep_interval,
        };

        if cache.enabled && cache.capacity > 0 {
            cache.spawn_sweeper();
        }

        cache
    }

    /// Look up a previously computed result; expired entries are never served
    pub fn get(&self, input: &str) -> Option<SkillResult> {
        let entries = self.entries.read();
        entries.get(input).and_then(|entry| {
            if entry.created_at.elapsed() < self.ttl {
                trace!(input_len = input.len(), "cache hit");
                Some(entry.result.clone())
            } else {
                None
            }
        })
    }

    /// Store a result; no-op when caching is disabled or capacity is zero
    ///
    /// At capacity, the globally oldest entry is evicted first. A write
    /// after the sweeper has terminated brings it back up.
    pub fn set(&self, input: &str, result: SkillResult) {
        if !self.enabled || self.capacity == 0 {
            return;
        }

        {
            let mut entries = self.entries.write();
            if entries.len() >= self.capacity {
                evict_oldest(&mut entries);
            }
            entries.insert(
                input.to_string(),
                CacheEntry {
                    result,
                    created_at: Instant::now(),
                },
            );
        }

        self.spawn_sweeper();
    }

    /// Number of live-or-expired entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_sweeper(&self) {
        // Only one sweeper at a time
        if self
            .sweeper_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let entries = Arc::clone(&self.entries);
        let running = Arc::clone(&self.sweeper_running);
        let ttl = self.ttl;
        let interval = self.sweep_interval;

        thread::Builder::new()
            .name("cache-sweeper".to_string())
            .spawn(move || loop {
                thread::sleep(interval);

                let mut entries = entries.write();
                let before = entries.len();
                entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
                let swept = before - entries.len();
                if swept > 0 {
                    debug!(swept, remaining = entries.len(), "swept expired cache entries");
                }

                // Self-terminate once the cache drains
                if entries.is_empty() {
                    running.store(false, Ordering::Release);
                    return;
                }
            })
            .ok();
    }
}

fn evict_oldest(entries: &mut HashMap<String, CacheEntry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.created_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::SkillStatus;
    use chrono::Utc;

    fn cache_with(enabled: bool, size: usize, ttl: &str) -> QueryCache {
        let mut config = Config::default();
        config.cache.enabled = enabled;
        config.cache.size = size;
        config.cache.ttl = ttl.to_string();
        QueryCache::with_sweep_interval(Arc::new(config), Duration::from_millis(20))
    }

    fn result(query_id: &str) -> SkillResult {
        SkillResult {
            query_id: query_id.to_string(),
            result: vec![1, 2, 3],
            meta: Vec::new(),
            timestamp: Utc::now(),
            status: SkillStatus::Success,
        }
    }

    #[test]
    fn disabled_cache_ignores_writes() {
        let cache = cache_with(false, 10, "5m");
        cache.set("query", result("q1"));
        assert!(cache.get("query").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_cache_never_stores() {
        let cache = cache_with(true, 0, "5m");
        cache.set("query", result("q1"));
        assert!(cache.get("query").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn stored_result_is_served_within_ttl() {
        let cache = cache_with(true, 10, "5m");
        cache.set("query", result("q1"));
        let hit = cache.get("query").expect("entry should be live");
        assert_eq!(hit.query_id, "q1");
    }

    #[test]
    fn expired_entry_is_not_served() {
        let cache = cache_with(true, 10, "30ms");
        cache.set("query", result("q1"));
        thread::sleep(Duration::from_millis(60));
        assert!(cache.get("query").is_none());
    }

    #[test]
    fn capacity_bound_evicts_oldest_entry() {
        let cache = cache_with(true, 2, "5m");
        cache.set("first", result("q1"));
        thread::sleep(Duration::from_millis(5));
        cache.set("second", result("q2"));
        thread::sleep(Duration::from_millis(5));
        cache.set("third", result("q3"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first").is_none());
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[test]
    fn sweeper_removes_expired_entries() {
        let cache = cache_with(true, 10, "10ms");
        cache.set("query", result("q1"));
        thread::sleep(Duration::from_millis(120));
        assert!(cache.is_empty(), "sweeper should have drained the cache");
    }

    #[test]
    fn writes_after_sweeper_exit_still_expire() {
        let cache = cache_with(true, 10, "10ms");
        cache.set("one", result("q1"));
        // Let the sweeper drain the cache and terminate itself
        thread::sleep(Duration::from_millis(120));
        assert!(cache.is_empty());

        // The next write respawns it
        cache.set("two", result("q2"));
        thread::sleep(Duration::from_millis(120));
        assert!(cache.is_empty(), "respawned sweeper should expire new entries");
    }
}
