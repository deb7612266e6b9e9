//! # Webhook Processing Module
//!
//! Turns a raw identity-provider delivery into a typed event, then enriches,
//! dispatches and invalidates caches for it.
//!
//! The stages run in a fixed order for every delivery:
//!
//! 1. [`SignatureVerifier`] authenticates the body and rejects replays
//! 2. [`EventParser`] maps the `event_type` discriminator onto an [`Event`]
//! 3. [`EventEnricher`] loads fresh user/organisation snapshots
//! 4. [`EventDispatcher`] notifies observers
//! 5. [`CacheInvalidator`] forgets the cache keys the change made stale
//!
//! [`WebhookPipeline`] drives the stages and folds their outcomes into a
//! [`ProcessingResult`].

use crate::{ErrorCategory, Timestamp};
use bytes::Bytes;
use std::collections::HashMap;

// ============================================================================
// Submodules
// ============================================================================

mod cache;
mod dispatch;
mod enricher;
mod entities;
mod events;
mod invalidator;
mod parser;
mod payload;
mod pipeline;
mod policy;
mod result;
mod signature;

pub use cache::{CacheError, CacheStore};
pub use dispatch::{DispatchError, EventBus, EventDispatcher, EventListener, EventNotification};
pub use enricher::{Enrichment, EnrichmentError, EventEnricher};
pub use entities::{FetchError, Freshness, OrgFetcher, OrgSnapshot, UserFetcher, UserSnapshot};
pub use events::{
    Event, EventKind, OrgCreated, OrgDeleted, OrgUpdated, UnknownEventKind, UserAddedToOrg,
    UserCreated, UserDeleted, UserDisabled, UserEnabled, UserLocked, UserRemovedFromOrg,
    UserRoleChangedWithinOrg, UserUpdated,
};
pub use invalidator::{CacheInvalidator, Invalidation, InvalidationError, KeyFailure};
pub use parser::{EventParseError, EventParser};
pub use payload::VerifiedPayload;
pub use pipeline::{WebhookPipeline, WebhookPipelineBuilder};
pub use policy::{
    CacheKeyTemplates, PolicyError, PolicySummary, WebhookPolicy, WebhookPolicyBuilder,
    DEFAULT_TIMESTAMP_TOLERANCE_SECONDS,
};
pub use result::{PipelineStage, ProcessingResult, ProcessingStatus, ResultSummary};
pub use signature::{
    is_timestamp_fresh, SecretError, SignatureVerifier, SigningSecret, VerificationError,
    VerificationFailure, MESSAGE_ID_HEADERS, SIGNATURE_HEADERS, TIMESTAMP_HEADERS,
};

// ============================================================================
// Envelope
// ============================================================================

/// Case-insensitive view over the HTTP headers of a delivery
///
/// Header names are normalised to lowercase on insert so lookups never
/// depend on how the transport spelled them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    entries: HashMap<String, String>,
}

impl WebhookHeaders {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build headers from a raw name/value map
    pub fn from_map(headers: &HashMap<String, String>) -> Self {
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    /// Insert a header, replacing any previous value for the same name
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up a header by name, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Return the first header present among `names`
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Raw delivery as received from the transport
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub received_at: Timestamp,
}

impl WebhookEnvelope {
    /// Create a new envelope stamped with the current time
    pub fn new(headers: WebhookHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
            received_at: Timestamp::now(),
        }
    }

    /// Delivery identifier, if the sender supplied one
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get_any(&MESSAGE_ID_HEADERS)
    }

    /// Raw timestamp header value
    pub fn timestamp(&self) -> Option<&str> {
        self.headers.get_any(&TIMESTAMP_HEADERS)
    }

    /// Raw signature header value
    pub fn signature(&self) -> Option<&str> {
        self.headers.get_any(&SIGNATURE_HEADERS)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level error for the webhook pipeline
///
/// Wraps the stage-specific errors so callers can categorise any failure
/// without matching on every stage.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Event parsing failed: {0}")]
    Parse(#[from] EventParseError),

    #[error("Enrichment failed: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Cache invalidation failed: {0}")]
    Invalidation(#[from] InvalidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] PolicyError),
}

impl WebhookError {
    /// Check if the error is transient and the delivery worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Verification(_) | Self::Parse(_) | Self::Configuration(_) => false,
            Self::Enrichment(e) => e.is_transient(),
            Self::Dispatch(e) => e.is_transient(),
            Self::Invalidation(e) => e.is_transient(),
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Verification(e) => e.error_category(),
            Self::Parse(_) => ErrorCategory::Permanent,
            Self::Configuration(_) => ErrorCategory::Configuration,
            _ if self.is_transient() => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Pipeline stage the error originated from
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Verification(_) => PipelineStage::Verification,
            Self::Parse(_) => PipelineStage::Parsing,
            Self::Enrichment(_) => PipelineStage::Enrichment,
            Self::Dispatch(_) => PipelineStage::Dispatch,
            Self::Invalidation(_) => PipelineStage::Invalidation,
            Self::Configuration(_) => PipelineStage::Configuration,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
