//! Hot in-memory tier: exact keys, scored eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::fingerprint::ContextFingerprint;
use crate::request::Feature;

/// Entries lose half a point of score per minute of age.
const AGE_PENALTY_PER_MINUTE: f64 = 0.5;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub response: String,
    pub created_at: Instant,
    pub ttl: Duration,
    pub hit_count: u32,
    pub fingerprint: ContextFingerprint,
    pub feature: Feature,
    pub language: String,
    pub model: String,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    /// Eviction score. Frequently hit entries survive, old ones decay.
    fn score(&self, now: Instant) -> f64 {
        let age_minutes = now.duration_since(self.created_at).as_secs_f64() / 60.0;
        self.hit_count as f64 - age_minutes * AGE_PENALTY_PER_MINUTE
    }
}

/// Bounded exact-match tier.
#[derive(Debug)]
pub struct HotCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    purge_fraction: f64,
}

impl HotCache {
    pub fn new(capacity: usize, purge_fraction: f64) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            purge_fraction,
        }
    }

    /// Look up an exact key.
    ///
    /// The fingerprint must match unless the entry has earned fuzzy
    /// trust through repeated hits. Expired entries are dropped on
    /// contact.
    pub fn get(
        &mut self,
        key: &str,
        fingerprint: &ContextFingerprint,
        fuzzy_trust_hits: u32,
    ) -> Option<String> {
        let now = Instant::now();
        if self
            .entries
            .get(key)
            .map(|e| e.is_expired(now))
            .unwrap_or(false)
        {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        if entry.fingerprint != *fingerprint && entry.hit_count <= fuzzy_trust_hits {
            return None;
        }
        entry.hit_count += 1;
        Some(entry.response.clone())
    }

    /// Insert or refresh an entry, evicting the lowest-scoring fifth when
    /// over capacity. Returns how many entries were evicted.
    ///
    /// A refresh that stores the same response under the same fingerprint
    /// keeps the accumulated hit count, so trust survives re-insertion.
    pub fn upsert(&mut self, mut entry: CacheEntry) -> usize {
        if let Some(existing) = self.entries.get(&entry.key) {
            if existing.fingerprint == entry.fingerprint && existing.response == entry.response {
                entry.hit_count = entry.hit_count.max(existing.hit_count);
            }
        }
        self.entries.insert(entry.key.clone(), entry);
        if self.entries.len() > self.capacity {
            self.evict()
        } else {
            0
        }
    }

    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict(&mut self) -> usize {
        let now = Instant::now();
        let mut scored: Vec<(String, f64, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.score(now), e.created_at))
            .collect();
        // Lowest score first; ties fall to the oldest entry.
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
        let purge = ((self.entries.len() as f64) * self.purge_fraction).ceil() as usize;
        let purge = purge.max(1);
        for (key, _, _) in scored.into_iter().take(purge) {
            self.entries.remove(&key);
        }
        purge
    }
}
