//! Read-through cache capability.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Key/value cache shared with the read side of the application
///
/// Implementations must tolerate concurrent callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value, optionally expiring after `ttl`
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key
    ///
    /// Returns whether an entry was present. Forgetting a missing key is not
    /// an error.
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;

    async fn flush(&self) -> Result<(), CacheError>;
}

/// Errors raised by cache stores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {message}")]
    Unavailable { message: String },

    #[error("Cache operation failed for key '{key}': {message}")]
    OperationFailed { key: String, message: String },
}

impl CacheError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
