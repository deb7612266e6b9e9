//! # Earhart Core
//!
//! Core business logic for ingesting identity-provider webhooks.
//!
//! This crate verifies signed webhook deliveries, parses them into typed
//! events, enriches the events with fresh user and organisation snapshots,
//! notifies observers, and invalidates the read-through cache entries the
//! change made stale.
//!
//! ## Architecture
//!
//! The pipeline depends only on trait abstractions:
//! - [`webhook::UserFetcher`] / [`webhook::OrgFetcher`] for entity snapshots
//! - [`webhook::CacheStore`] for the read-through cache
//! - [`webhook::EventDispatcher`] for observer notification
//!
//! Infrastructure implementations are injected when the pipeline is built.
//!
//! ## Usage
//!
//! ```rust
//! use earhart_core::{CorrelationId, RunId};
//!
//! let run_id = RunId::new();
//! let correlation_id = CorrelationId::new();
//! assert_ne!(run_id.as_str(), correlation_id.as_str());
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a single pipeline run
///
/// Uses ULID so that runs sort lexicographically by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new unique run ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get string representation of run ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ValidationError::InvalidFormat {
            field: "run_id".to_string(),
            message: format!("expected ULID, got '{}'", s),
        })?;
        Ok(Self(ulid))
    }
}

/// Identifier for tracing a delivery across system boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ValidationError::InvalidFormat {
            field: "correlation_id".to_string(),
            message: format!("expected UUID, got '{}'", s),
        })?;
        Ok(Self(uuid))
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from Unix seconds
    ///
    /// Returns `None` when the value is outside the representable range.
    pub fn from_unix_seconds(seconds: i64) -> Option<Self> {
        Utc.timestamp_opt(seconds, 0).single().map(Self)
    }

    /// Seconds since the Unix epoch
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Add seconds to timestamp
    pub fn add_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + chrono::Duration::seconds(seconds))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that should be retried
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring immediate attention
    Security,
    /// Configuration errors preventing startup
    Configuration,
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook processing pipeline
pub mod webhook;

/// Infrastructure adapters for the pipeline's external capabilities
pub mod adapters;

// Re-export key types for convenience
pub use adapters::InMemoryCacheStore;
pub use webhook::{
    CacheInvalidator, CacheStore, Event, EventBus, EventDispatcher, EventEnricher, EventKind,
    EventParser, OrgFetcher, OrgSnapshot, ProcessingResult, ProcessingStatus, SignatureVerifier,
    UserFetcher, UserSnapshot, VerifiedPayload, WebhookEnvelope, WebhookError, WebhookPipeline,
    WebhookPolicy,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
