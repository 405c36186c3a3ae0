//! TTL cache of already-processed article URLs.
//!
//! Backed by a human-diffable JSON file mapping URL to an RFC 3339 timestamp.
//! Entries expire lazily: an expired entry encountered during a membership
//! check is removed on the spot; there is no background sweep. Every insert
//! rewrites the whole file so a crash right after an insert never loses the
//! record. At the expected scale (tens of entries per day) the O(n) write is
//! irrelevant.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ArticleCache {
    path: PathBuf,
    ttl: Duration,
    entries: HashMap<String, String>,
}

impl ArticleCache {
    /// Load the cache from `path`. A missing or unreadable file yields an
    /// empty cache, not an error.
    pub fn load(path: impl AsRef<Path>, ttl_hours: i64) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cache file unparsable; starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        info!(path = %path.display(), entries = entries.len(), ttl_hours, "Article cache loaded");
        Self {
            path,
            ttl: Duration::hours(ttl_hours),
            entries,
        }
    }

    /// True iff an unexpired entry exists for `url`. Expired entries found
    /// along the way are pruned.
    pub fn is_cached(&mut self, url: &str) -> bool {
        self.is_cached_at(url, Utc::now())
    }

    fn is_cached_at(&mut self, url: &str, now: DateTime<Utc>) -> bool {
        let Some(stored) = self.entries.get(url) else {
            return false;
        };

        let expired = match DateTime::parse_from_rfc3339(stored) {
            Ok(processed_at) => now > processed_at.with_timezone(&Utc) + self.ttl,
            Err(e) => {
                warn!(url, error = %e, "Unparsable cache timestamp; treating as expired");
                true
            }
        };

        if expired {
            debug!(url, "Cache entry expired; pruning");
            self.entries.remove(url);
            return false;
        }
        true
    }

    /// Insert (or refresh) `url` with the current timestamp and persist the
    /// whole cache synchronously.
    pub fn add(&mut self, url: &str) -> Result<()> {
        self.entries
            .insert(url.to_string(), Utc::now().to_rfc3339());
        self.save()
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    #[cfg(test)]
    fn insert_raw(&mut self, url: &str, timestamp: &str) {
        self.entries.insert(url.to_string(), timestamp.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = tempdir().unwrap();
        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 24);
        assert!(!cache.is_cached("https://example.com/a"));
    }

    #[test]
    fn test_add_is_idempotent_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let url = "https://example.com/article";

        let mut cache = ArticleCache::load(&path, 24);
        cache.add(url).unwrap();
        cache.add(url).unwrap();
        assert!(cache.is_cached(url));

        // Survives a reload from disk.
        let mut reloaded = ArticleCache::load(&path, 24);
        assert!(reloaded.is_cached(url));
    }

    #[test]
    fn test_expired_entry_is_pruned_on_read() {
        let dir = tempdir().unwrap();
        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 1);
        let url = "https://example.com/old";

        let two_hours_ago = Utc::now() - Duration::hours(2);
        cache.insert_raw(url, &two_hours_ago.to_rfc3339());

        assert!(!cache.is_cached(url));
        // The prune is physical: a fresh check takes the absent-key path.
        assert!(!cache.entries.contains_key(url));
    }

    #[test]
    fn test_unexpired_entry_with_simulated_clock() {
        let dir = tempdir().unwrap();
        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 24);
        let url = "https://example.com/fresh";

        let now = Utc::now();
        cache.insert_raw(url, &now.to_rfc3339());

        assert!(cache.is_cached_at(url, now + Duration::hours(23)));
        assert!(!cache.is_cached_at(url, now + Duration::hours(25)));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json{{{").unwrap();

        let mut cache = ArticleCache::load(&path, 24);
        assert!(!cache.is_cached("https://example.com/a"));
    }

    #[test]
    fn test_garbage_timestamp_treated_as_expired() {
        let dir = tempdir().unwrap();
        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 24);
        cache.insert_raw("https://example.com/bad", "yesterday-ish");
        assert!(!cache.is_cached("https://example.com/bad"));
    }
}
