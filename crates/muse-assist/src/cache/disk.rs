//! Persistent tier: one JSON file per context fingerprint.
//!
//! All failures here are soft. A cache that cannot read or write
//! degrades to misses, never to errors.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fingerprint::ContextFingerprint;
use crate::request::Feature;

/// Serialized form of a cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub response: String,
    pub created_at_secs: u64,
    pub ttl_secs: u64,
    pub hit_count: u32,
    pub feature: Feature,
    pub language: String,
    pub model: String,
}

impl PersistedEntry {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        secs_since_epoch(now).saturating_sub(self.created_at_secs) >= self.ttl_secs
    }

    /// TTL left on the wall clock, for promotion into the hot tier.
    pub fn remaining_ttl(&self, now: SystemTime) -> Duration {
        let left = (self.created_at_secs + self.ttl_secs).saturating_sub(secs_since_epoch(now));
        Duration::from_secs(left)
    }
}

/// Disk tier, one file per fingerprint under a cache directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, fingerprint: &ContextFingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    /// Load the entry for a fingerprint. The stored key must match the
    /// requested one. Corrupt and expired files are removed on contact.
    pub fn load(&self, fingerprint: &ContextFingerprint, key: &str) -> Option<PersistedEntry> {
        let path = self.path_for(fingerprint);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };
        let entry: PersistedEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Corrupt cache entry {}: {}", path.display(), e);
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };
        if entry.is_expired(SystemTime::now()) {
            debug!("Cache entry {} expired", path.display());
            let _ = std::fs::remove_file(&path);
            return None;
        }
        if entry.key != key {
            return None;
        }
        Some(entry)
    }

    /// Best-effort write. Failures are logged and swallowed.
    pub fn store(&self, fingerprint: &ContextFingerprint, entry: &PersistedEntry) {
        if let Err(e) = self.try_store(fingerprint, entry) {
            warn!("Cache write failed for {}: {}", fingerprint, e);
        }
    }

    fn try_store(
        &self,
        fingerprint: &ContextFingerprint,
        entry: &PersistedEntry,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(entry)?;
        std::fs::write(self.path_for(fingerprint), json)
    }

    /// Remove every persisted entry.
    pub fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn secs_since_epoch(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current wall-clock seconds, the `created_at_secs` of a fresh entry.
pub fn entry_timestamp() -> u64 {
    secs_since_epoch(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CodeContext;

    fn fingerprint() -> ContextFingerprint {
        ContextFingerprint::of(&CodeContext {
            language: "rust".to_string(),
            enclosing_symbol: Some("main".to_string()),
            imports: vec!["use std::fs;".to_string()],
        })
    }

    fn sample(key: &str, ttl_secs: u64) -> PersistedEntry {
        PersistedEntry {
            key: key.to_string(),
            response: "let x = 1;".to_string(),
            created_at_secs: entry_timestamp(),
            ttl_secs,
            hit_count: 2,
            feature: Feature::Completion,
            language: "rust".to_string(),
            model: "test".to_string(),
        }
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&fingerprint(), &sample("let x = ", 60));
        let loaded = cache.load(&fingerprint(), "let x = ").unwrap();
        assert_eq!(loaded.response, "let x = 1;");
        assert_eq!(loaded.hit_count, 2);
    }

    #[test]
    fn test_key_mismatch_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&fingerprint(), &sample("let x = ", 60));
        assert!(cache.load(&fingerprint(), "let y = ").is_none());
    }

    #[test]
    fn test_corrupt_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let path = dir.path().join(format!("{}.json", fingerprint()));
        std::fs::write(&path, "{not json").unwrap();
        assert!(cache.load(&fingerprint(), "let x = ").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&fingerprint(), &sample("let x = ", 0));
        assert!(cache.load(&fingerprint(), "let x = ").is_none());
        assert!(!dir.path().join(format!("{}.json", fingerprint())).exists());
    }

    #[test]
    fn test_missing_directory_is_a_miss() {
        let cache = DiskCache::new("/nonexistent/muse-cache");
        assert!(cache.load(&fingerprint(), "k").is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&fingerprint(), &sample("a", 60));
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.load(&fingerprint(), "a").is_none());
    }
}
