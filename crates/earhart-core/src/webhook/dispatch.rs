//! Event dispatch to observers.
//!
//! The pipeline hands every parsed event to an [`EventDispatcher`]. The
//! in-process [`EventBus`] fans the event out to registered
//! [`EventListener`]s, optionally filtered by event kind.
//!
//! # Examples
//!
//! ```rust
//! use earhart_core::webhook::{EventBus, EventListener, EventNotification};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct AuditListener;
//!
//! #[async_trait]
//! impl EventListener for AuditListener {
//!     async fn handle_event(
//!         &self,
//!         notification: &EventNotification,
//!     ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         println!("received {}", notification.event.event_type());
//!         Ok(())
//!     }
//! }
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(Arc::new(AuditListener));
//! assert_eq!(bus.listener_count(), 1);
//! ```

use super::enricher::Enrichment;
use super::events::{Event, EventKind};
use crate::{CorrelationId, Timestamp};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error};

/// Event handed to observers
#[derive(Debug, Clone)]
pub struct EventNotification {
    pub event: Event,
    /// Snapshots loaded for the event; empty when enrichment failed or is off
    pub enrichment: Enrichment,
    pub delivery_id: Option<String>,
    pub correlation_id: CorrelationId,
    pub received_at: Timestamp,
}

impl EventNotification {
    pub fn is_enriched(&self) -> bool {
        !self.enrichment.is_empty()
    }
}

/// Notifies observers of a parsed event
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &EventNotification) -> Result<(), DispatchError>;
}

/// Application-provided event observer
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event
    ///
    /// An error stops dispatch and fails the delivery.
    async fn handle_event(
        &self,
        notification: &EventNotification,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct Subscription {
    listener: Arc<dyn EventListener>,
    kinds: Option<BTreeSet<EventKind>>,
}

impl Subscription {
    fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// In-process dispatcher calling listeners in registration order
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event kind
    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) -> &mut Self {
        self.subscriptions.push(Subscription {
            listener,
            kinds: None,
        });
        self
    }

    /// Register a listener for the given kinds only
    pub fn subscribe_to(
        &mut self,
        kinds: impl IntoIterator<Item = EventKind>,
        listener: Arc<dyn EventListener>,
    ) -> &mut Self {
        self.subscriptions.push(Subscription {
            listener,
            kinds: Some(kinds.into_iter().collect()),
        });
        self
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl EventDispatcher for EventBus {
    async fn dispatch(&self, notification: &EventNotification) -> Result<(), DispatchError> {
        let kind = notification.event.kind();

        for subscription in self.subscriptions.iter().filter(|s| s.accepts(kind)) {
            let listener = subscription.listener.name().to_string();
            debug!(listener = %listener, event_type = %kind, "Dispatching event");

            if let Err(e) = subscription.listener.handle_event(notification).await {
                error!(listener = %listener, event_type = %kind, error = %e, "Listener failed");
                return Err(DispatchError::Listener {
                    listener,
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Dispatch failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Listener '{listener}' failed: {message}")]
    Listener { listener: String, message: String },

    #[error("Dispatcher unavailable: {message}")]
    Unavailable { message: String },
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
