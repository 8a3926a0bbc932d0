//! Pre-authenticated URL cache with pluggable storage.
//!
//! Object-storage URLs are expensive to mint and valid for a limited time.
//! `UrlCache` hands back a stored URL while it is still comfortably valid
//! and lets the caller mint a fresh one otherwise.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MediaChunkError, Result};

/// Default margin before expiry at which a URL is considered stale.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage behind a `UrlCache`.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedUrl>>;
    fn put(&self, key: &str, entry: CachedUrl) -> Result<()>;
    /// Keep only entries accepted by `keep`, returning how many were dropped.
    fn retain(&self, keep: &dyn Fn(&CachedUrl) -> bool) -> Result<usize>;
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CachedUrl>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> MediaChunkError {
    MediaChunkError::Storage("URL cache lock poisoned".to_string())
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<CachedUrl>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn put(&self, key: &str, entry: CachedUrl) -> Result<()> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn retain(&self, keep: &dyn Fn(&CachedUrl) -> bool) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, v| keep(v));
        Ok(before - entries.len())
    }
}

/// JSON file backend. The whole map is rewritten on every change.
pub struct FileBackend {
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedUrl>>,
}

impl FileBackend {
    /// Open `path`, starting empty if it is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring corrupt URL cache {}: {}", path.display(), e);
                HashMap::new()
            })
        } else {
            HashMap::new()
        };
        debug!("Loaded {} cached URLs from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, CachedUrl>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl CacheBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<CachedUrl>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn put(&self, key: &str, entry: CachedUrl) -> Result<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(key.to_string(), entry);
        self.persist(&entries)
    }

    fn retain(&self, keep: &dyn Fn(&CachedUrl) -> bool) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, v| keep(v));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }
}

pub struct UrlCache<B: CacheBackend> {
    backend: B,
    safety_margin: Duration,
}

impl<B: CacheBackend> UrlCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    fn is_fresh(&self, entry: &CachedUrl, now: DateTime<Utc>) -> bool {
        entry.expires_at - self.safety_margin > now
    }

    /// Cached URL for `key` if it is not close to expiry.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        Ok(self
            .backend
            .get(key)?
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.url))
    }

    pub fn insert(&self, key: &str, url: impl Into<String>, ttl: Duration) -> Result<()> {
        self.backend.put(
            key,
            CachedUrl {
                url: url.into(),
                expires_at: Utc::now() + ttl,
            },
        )
    }

    /// Return the cached URL or mint, store and return a new one.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Duration, mint: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(url) = self.get(key)? {
            debug!("URL cache hit for {}", key);
            return Ok(url);
        }
        let url = mint()?;
        self.insert(key, url.clone(), ttl)?;
        Ok(url)
    }

    /// Drop stale entries, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        self.backend.retain(&|entry: &CachedUrl| self.is_fresh(entry, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let cache = UrlCache::new(MemoryBackend::new());
        assert!(cache.get("a.mp4").unwrap().is_none());

        cache
            .insert("a.mp4", "https://objects/a.mp4?sig=1", Duration::hours(1))
            .unwrap();
        assert_eq!(
            cache.get("a.mp4").unwrap().as_deref(),
            Some("https://objects/a.mp4?sig=1")
        );
    }

    #[test]
    fn test_near_expiry_is_stale() {
        let cache = UrlCache::new(MemoryBackend::new()).with_safety_margin(Duration::minutes(10));
        cache
            .insert("a.mp4", "https://objects/a.mp4", Duration::minutes(5))
            .unwrap();
        assert!(cache.get("a.mp4").unwrap().is_none());
    }

    #[test]
    fn test_get_or_insert_with_mints_once() {
        let cache = UrlCache::new(MemoryBackend::new());
        let mut calls = 0;
        for _ in 0..3 {
            let url = cache
                .get_or_insert_with("b.jpg", Duration::hours(2), || {
                    calls += 1;
                    Ok("https://objects/b.jpg".to_string())
                })
                .unwrap();
            assert_eq!(url, "https://objects/b.jpg");
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = UrlCache::new(MemoryBackend::new());
        cache.insert("old", "u1", Duration::seconds(-10)).unwrap();
        cache.insert("new", "u2", Duration::hours(1)).unwrap();
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.get("new").unwrap().is_some());
    }

    #[test]
    fn test_file_backend_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("urls.json");

        {
            let cache = UrlCache::new(FileBackend::open(&path).unwrap());
            cache.insert("c.mov", "https://objects/c.mov", Duration::hours(1)).unwrap();
        }

        let reopened = UrlCache::new(FileBackend::open(&path).unwrap());
        assert_eq!(
            reopened.get("c.mov").unwrap().as_deref(),
            Some("https://objects/c.mov")
        );
    }

    #[test]
    fn test_file_backend_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = UrlCache::new(FileBackend::open(&path).unwrap());
        assert!(cache.get("x").unwrap().is_none());
    }
}
