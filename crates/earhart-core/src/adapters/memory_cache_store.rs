//! # In-Memory Cache Store
//!
//! Thread-safe in-memory [`CacheStore`] for tests, development and the CLI.
//! Entries may carry a TTL; expired entries read as absent and are dropped
//! lazily.

use crate::webhook::{CacheError, CacheStore};
use crate::Timestamp;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Timestamp>,
}

impl CacheEntry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Thread-safe in-memory cache
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheStore {
    /// Create new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cache pre-populated with non-expiring entries
    pub fn with_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = entries
            .into_iter()
            .map(|(key, value)| {
                (
                    key.into(),
                    CacheEntry {
                        value,
                        expires_at: None,
                    },
                )
            })
            .collect();

        Self {
            entries: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Timestamp::now();
        self.read()
            .map(|entries| entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Timestamp::now();
        self.read()
            .map(|entries| entries.get(key).is_some_and(|e| !e.is_expired(now)))
            .unwrap_or(false)
    }

    /// Live keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = Timestamp::now();
        let mut keys: Vec<String> = self
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, e)| !e.is_expired(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        message: "cache lock poisoned".to_string(),
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Timestamp::now();
        let mut entries = self.write()?;

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = match ttl {
            Some(ttl) => {
                let seconds =
                    i64::try_from(ttl.as_secs()).map_err(|_| CacheError::OperationFailed {
                        key: key.to_string(),
                        message: format!("ttl out of range: {:?}", ttl),
                    })?;
                Some(Timestamp::now().add_seconds(seconds))
            }
            None => None,
        };

        self.write()?
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let now = Timestamp::now();
        Ok(self
            .write()?
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_cache_store_tests.rs"]
mod tests;
