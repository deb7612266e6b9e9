//! Tests for event dispatch.

use super::*;
use crate::webhook::events::{OrgCreated, UserLocked};
use std::sync::Mutex;

// ============================================================================
// Recording Listeners
// ============================================================================

struct RecordingListener {
    name: String,
    seen: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingListener {
    fn new(name: &str, seen: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            seen,
            fail: false,
        }
    }

    fn failing(name: &str, seen: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fail: true,
            ..Self::new(name, seen)
        }
    }
}

#[async_trait]
impl EventListener for RecordingListener {
    async fn handle_event(
        &self,
        notification: &EventNotification,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.seen.lock().unwrap().push(format!(
            "{}:{}",
            self.name,
            notification.event.event_type()
        ));
        if self.fail {
            return Err("listener exploded".into());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn notification(event: Event) -> EventNotification {
    EventNotification {
        event,
        enrichment: Enrichment::default(),
        delivery_id: Some("msg_1".to_string()),
        correlation_id: CorrelationId::new(),
        received_at: Timestamp::now(),
    }
}

fn user_locked() -> Event {
    Event::UserLocked(UserLocked {
        user_id: "u1".to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_empty_bus_dispatch_succeeds() {
    let bus = EventBus::new();
    assert!(bus.dispatch(&notification(user_locked())).await.is_ok());
}

#[tokio::test]
async fn test_listeners_called_in_registration_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::new();
    bus.subscribe(Arc::new(RecordingListener::new("first", seen.clone())))
        .subscribe(Arc::new(RecordingListener::new("second", seen.clone())));

    bus.dispatch(&notification(user_locked())).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["first:user.locked", "second:user.locked"]
    );
}

#[tokio::test]
async fn test_kind_filter_limits_delivery() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::new();
    bus.subscribe_to(
        [EventKind::OrgCreated],
        Arc::new(RecordingListener::new("orgs", seen.clone())),
    );

    bus.dispatch(&notification(user_locked())).await.unwrap();
    bus.dispatch(&notification(Event::OrgCreated(OrgCreated {
        org_id: "o1".to_string(),
        name: "Acme".to_string(),
    })))
    .await
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["orgs:org.created"]);
}

#[tokio::test]
async fn test_listener_failure_stops_dispatch() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::new();
    bus.subscribe(Arc::new(RecordingListener::failing("broken", seen.clone())))
        .subscribe(Arc::new(RecordingListener::new("after", seen.clone())));

    let error = bus
        .dispatch(&notification(user_locked()))
        .await
        .unwrap_err();

    assert_eq!(
        error,
        DispatchError::Listener {
            listener: "broken".to_string(),
            message: "listener exploded".to_string(),
        }
    );
    assert!(!error.is_transient());
    assert_eq!(*seen.lock().unwrap(), vec!["broken:user.locked"]);
}

#[test]
fn test_notification_reports_enrichment() {
    let plain = notification(user_locked());
    assert!(!plain.is_enriched());
}
