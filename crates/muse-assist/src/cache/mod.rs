//! Multi-tier adaptive response cache.
//!
//! Lookup walks three tiers in order: an exact-match hot tier, a
//! generalized pattern tier, and a persistent disk tier keyed by context
//! fingerprint. Disk hits are promoted back into the hot tier. Writes
//! always land in the hot and pattern tiers; only significant entries
//! reach disk.

mod disk;
mod hot;
mod pattern;
mod stats;

pub use disk::{DiskCache, PersistedEntry};
pub use hot::{CacheEntry, HotCache};
pub use pattern::{generalize, GeneralizedKey, PatternStore};
pub use stats::{CacheCounters, CacheStats};

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::time::{Instant, SystemTime};

use tracing::debug;

use crate::fingerprint::ContextFingerprint;
use crate::request::{CodeContext, Feature};

/// Tuning for the cache tiers.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hot tier entry cap.
    pub hot_capacity: usize,
    /// Pattern tier entry cap.
    pub pattern_capacity: usize,
    /// Fraction of a tier purged per eviction.
    pub purge_fraction: f64,
    /// Minimum normalized similarity for a pattern match.
    pub similarity_floor: f64,
    /// Hits after which an entry is served across contexts.
    pub fuzzy_trust_hits: u32,
    /// Hits after which a non-eager feature is persisted.
    pub persist_min_hits: u32,
    /// Directory for the disk tier; `None` keeps the cache in memory.
    pub disk_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: 1000,
            pattern_capacity: 500,
            purge_fraction: 0.2,
            similarity_floor: 0.8,
            fuzzy_trust_hits: 3,
            persist_min_hits: 2,
            disk_dir: None,
        }
    }
}

/// The cache facade the engine talks to.
pub struct AdaptiveCache {
    hot: Mutex<HotCache>,
    patterns: Mutex<PatternStore>,
    disk: Option<DiskCache>,
    counters: CacheCounters,
    fuzzy_trust_hits: u32,
    persist_min_hits: u32,
}

impl AdaptiveCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            hot: Mutex::new(HotCache::new(config.hot_capacity, config.purge_fraction)),
            patterns: Mutex::new(PatternStore::new(
                config.pattern_capacity,
                config.similarity_floor,
                config.purge_fraction,
            )),
            disk: config.disk_dir.map(DiskCache::new),
            counters: CacheCounters::default(),
            fuzzy_trust_hits: config.fuzzy_trust_hits,
            persist_min_hits: config.persist_min_hits,
        }
    }

    /// Look a key up across all tiers.
    pub fn get(&self, key: &str, context: &CodeContext, feature: Feature) -> Option<String> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        let fingerprint = ContextFingerprint::of(context);

        if let Some(response) = self.hot().get(key, &fingerprint, self.fuzzy_trust_hits) {
            debug!("Hot cache hit for {:?}", feature);
            self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
            return Some(response);
        }

        if let Some(response) = self.patterns().lookup(key, &fingerprint) {
            debug!("Pattern cache hit for {:?}", feature);
            self.counters.pattern_hits.fetch_add(1, Ordering::Relaxed);
            return Some(response);
        }

        if let Some(disk) = &self.disk {
            if let Some(entry) = disk.load(&fingerprint, key) {
                debug!("Disk cache hit for {:?}, promoting", feature);
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                let response = entry.response.clone();
                self.hot().upsert(CacheEntry {
                    key: key.to_string(),
                    response: response.clone(),
                    created_at: Instant::now(),
                    ttl: entry.remaining_ttl(SystemTime::now()),
                    hit_count: entry.hit_count + 1,
                    fingerprint,
                    feature: entry.feature,
                    language: entry.language,
                    model: entry.model,
                });
                return Some(response);
            }
        }

        None
    }

    /// Record a response. The hot and pattern tiers always take it; the
    /// disk tier only when the feature or the hit count makes it worth
    /// keeping across sessions.
    pub fn set(
        &self,
        key: &str,
        response: &str,
        context: &CodeContext,
        feature: Feature,
        model: &str,
    ) {
        self.counters.insertions.fetch_add(1, Ordering::Relaxed);
        let fingerprint = ContextFingerprint::of(context);

        let (hit_count, evicted) = {
            let mut hot = self.hot();
            let evicted = hot.upsert(CacheEntry {
                key: key.to_string(),
                response: response.to_string(),
                created_at: Instant::now(),
                ttl: feature.ttl(),
                hit_count: 0,
                fingerprint: fingerprint.clone(),
                feature,
                language: context.language.clone(),
                model: model.to_string(),
            });
            let hits = hot.peek(key).map(|e| e.hit_count).unwrap_or(0);
            (hits, evicted)
        };
        if evicted > 0 {
            self.counters
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }

        self.patterns().record(key, response, fingerprint.clone());

        if let Some(disk) = &self.disk {
            if feature.persist_eagerly() || hit_count > self.persist_min_hits {
                disk.store(
                    &fingerprint,
                    &PersistedEntry {
                        key: key.to_string(),
                        response: response.to_string(),
                        created_at_secs: disk::entry_timestamp(),
                        ttl_secs: feature.ttl().as_secs(),
                        hit_count,
                        feature,
                        language: context.language.clone(),
                        model: model.to_string(),
                    },
                );
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.counters.snapshot();
        stats.hot_entries = self.hot().len();
        stats.pattern_entries = self.patterns().len();
        stats
    }

    /// Drop everything, including persisted entries.
    pub fn clear(&self) {
        self.hot().clear();
        self.patterns().clear();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                tracing::warn!("Failed to clear disk cache: {}", e);
            }
        }
    }

    fn hot(&self) -> MutexGuard<'_, HotCache> {
        self.hot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn patterns(&self) -> MutexGuard<'_, PatternStore> {
        self.patterns.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(symbol: &str) -> CodeContext {
        CodeContext {
            language: "rust".to_string(),
            enclosing_symbol: Some(symbol.to_string()),
            imports: vec!["use std::fs;".to_string()],
        }
    }

    fn memory_cache() -> AdaptiveCache {
        AdaptiveCache::new(CacheConfig::default())
    }

    #[test]
    fn test_set_then_get_same_context() {
        let cache = memory_cache();
        cache.set("let x = ", "1;", &context("main"), Feature::Completion, "m");
        let hit = cache.get("let x = ", &context("main"), Feature::Completion);
        assert_eq!(hit.as_deref(), Some("1;"));
        let stats = cache.stats();
        assert_eq!(stats.hot_hits, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[test]
    fn test_foreign_context_misses_until_trusted() {
        let cache = memory_cache();
        // A key unlike anything the pattern tier could match.
        let key = "@@";
        cache.set(key, "v", &context("main"), Feature::Completion, "m");
        assert!(cache.get(key, &context("other"), Feature::Completion).is_none());

        for _ in 0..4 {
            assert!(cache.get(key, &context("main"), Feature::Completion).is_some());
        }
        assert_eq!(
            cache.get(key, &context("other"), Feature::Completion).as_deref(),
            Some("v")
        );
    }

    #[test]
    fn test_pattern_tier_answers_similar_keys() {
        let cache = memory_cache();
        cache.set(
            "let total = price * 2;",
            "total = price * price",
            &context("main"),
            Feature::Completion,
            "m",
        );
        let hit = cache.get("let sum = cost * 3;", &context("main"), Feature::Completion);
        assert_eq!(hit.as_deref(), Some("sum = cost * cost"));
        assert_eq!(cache.stats().pattern_hits, 1);
    }

    #[test]
    fn test_disk_round_trip_and_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            disk_dir: Some(dir.path().to_path_buf()),
            ..CacheConfig::default()
        };
        let first = AdaptiveCache::new(config.clone());
        first.set("let x = ", "1;", &context("main"), Feature::Completion, "m");

        // A fresh cache over the same directory sees the entry.
        let second = AdaptiveCache::new(config);
        let hit = second.get("let x = ", &context("main"), Feature::Completion);
        assert_eq!(hit.as_deref(), Some("1;"));
        let stats = second.stats();
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.hot_entries, 1);

        // Promotion means the next lookup is a hot hit.
        assert!(second.get("let x = ", &context("main"), Feature::Completion).is_some());
        assert_eq!(second.stats().hot_hits, 1);
    }

    #[test]
    fn test_chat_entries_stay_off_disk_until_hot() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            disk_dir: Some(dir.path().to_path_buf()),
            ..CacheConfig::default()
        };
        let cache = AdaptiveCache::new(config.clone());
        cache.set("how do I read a file", "use fs", &context("main"), Feature::Chat, "m");

        let fresh = AdaptiveCache::new(config.clone());
        assert!(fresh.get("how do I read a file", &context("main"), Feature::Chat).is_none());

        // Three hits later the same write becomes significant.
        for _ in 0..3 {
            cache.get("how do I read a file", &context("main"), Feature::Chat);
        }
        cache.set("how do I read a file", "use fs", &context("main"), Feature::Chat, "m");
        let fresh = AdaptiveCache::new(config);
        assert!(fresh.get("how do I read a file", &context("main"), Feature::Chat).is_some());
    }

    #[test]
    fn test_stats_track_sizes() {
        let cache = memory_cache();
        cache.set("let a = 1;", "r", &context("main"), Feature::Completion, "m");
        cache.set("fn f() {}", "r", &context("main"), Feature::Completion, "m");
        let stats = cache.stats();
        assert_eq!(stats.hot_entries, 2);
        assert_eq!(stats.pattern_entries, 2);
        cache.clear();
        assert_eq!(cache.stats().hot_entries, 0);
    }
}
