//! Common test utilities for earhart-core integration tests
//!
//! This module provides:
//! - An in-memory identity directory implementing both fetch capabilities
//! - A recording event listener
//! - Helpers for building signed deliveries and assembled pipelines

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use earhart_core::webhook::{
    EventListener, EventNotification, FetchError, Freshness, OrgFetcher, OrgSnapshot,
    SignatureVerifier, UserFetcher, UserSnapshot, WebhookEnvelope, WebhookHeaders,
};
use earhart_core::{EventBus, InMemoryCacheStore, WebhookPipeline, WebhookPolicy};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub const SECRET: &str = "whsec_dGVzdC1zaWduaW5nLWtleS0wMTIzNDU2Nzg5";

// ============================================================================
// Identity Directory
// ============================================================================

/// In-memory identity provider
#[derive(Default)]
pub struct Directory {
    users: Mutex<HashMap<String, UserSnapshot>>,
    orgs: Mutex<HashMap<String, OrgSnapshot>>,
    fetches: Mutex<Vec<(String, Freshness)>>,
}

#[allow(dead_code)]
impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: &str, email: &str) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), user_snapshot(user_id, email));
        self
    }

    pub fn with_org(self, org_id: &str, name: &str) -> Self {
        self.orgs
            .lock()
            .unwrap()
            .insert(org_id.to_string(), org_snapshot(org_id, name));
        self
    }

    /// Every fetch made so far as `user:<id>` / `org:<id>`
    pub fn fetches(&self) -> Vec<(String, Freshness)> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserFetcher for Directory {
    async fn fetch_user(
        &self,
        user_id: &str,
        freshness: Freshness,
    ) -> Result<UserSnapshot, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((format!("user:{}", user_id), freshness));
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| FetchError::user_not_found(user_id))
    }
}

#[async_trait]
impl OrgFetcher for Directory {
    async fn fetch_org(&self, org_id: &str, freshness: Freshness) -> Result<OrgSnapshot, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((format!("org:{}", org_id), freshness));
        self.orgs
            .lock()
            .unwrap()
            .get(org_id)
            .cloned()
            .ok_or_else(|| FetchError::org_not_found(org_id))
    }
}

pub fn user_snapshot(user_id: &str, email: &str) -> UserSnapshot {
    UserSnapshot {
        user_id: user_id.to_string(),
        email: email.to_string(),
        email_confirmed: true,
        first_name: "Amelia".to_string(),
        last_name: "Earhart".to_string(),
        username: None,
        picture_url: String::new(),
        properties: Default::default(),
        locked: false,
        enabled: true,
        has_password: true,
        update_password_required: false,
        mfa_enabled: false,
        can_create_orgs: true,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        last_active_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

pub fn org_snapshot(org_id: &str, name: &str) -> OrgSnapshot {
    serde_json::from_value(serde_json::json!({"orgId": org_id, "name": name})).unwrap()
}

// ============================================================================
// Recording Listener
// ============================================================================

/// What a listener saw for one event
#[derive(Debug, Clone, PartialEq)]
pub struct Observed {
    pub event_type: String,
    pub user_email: Option<String>,
    pub org_name: Option<String>,
    pub delivery_id: Option<String>,
}

/// Listener recording every notification, optionally failing
#[derive(Default)]
pub struct RecordingListener {
    observed: Mutex<Vec<Observed>>,
    fail_with: Option<String>,
}

#[allow(dead_code)]
impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            observed: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventListener for RecordingListener {
    async fn handle_event(
        &self,
        notification: &EventNotification,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.observed.lock().unwrap().push(Observed {
            event_type: notification.event.event_type().to_string(),
            user_email: notification.enrichment.user.as_ref().map(|u| u.email.clone()),
            org_name: notification
                .enrichment
                .org
                .as_ref()
                .map(|o| o.display_name.clone()),
            delivery_id: notification.delivery_id.clone(),
        });

        match &self.fail_with {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ============================================================================
// Deliveries
// ============================================================================

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Delivery signed with [`SECRET`] at `timestamp`
pub fn signed_delivery(message_id: &str, body: &Value, timestamp: i64) -> WebhookEnvelope {
    let body = body.to_string();
    let signature = SignatureVerifier::new(SECRET)
        .unwrap()
        .sign(message_id, timestamp, body.as_bytes());

    let mut headers = WebhookHeaders::new();
    headers.insert("svix-id", message_id);
    headers.insert("svix-timestamp", timestamp.to_string());
    headers.insert("svix-signature", signature);
    WebhookEnvelope::new(headers, body)
}

// ============================================================================
// Assembled Pipeline
// ============================================================================

/// Pipeline wired to in-memory collaborators
pub struct Harness {
    pub pipeline: WebhookPipeline,
    pub directory: Arc<Directory>,
    pub listener: Arc<RecordingListener>,
    pub cache: InMemoryCacheStore,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(directory: Directory) -> Self {
        Self::with_policy(directory, default_policy(), RecordingListener::new())
    }

    pub fn with_policy(
        directory: Directory,
        policy: WebhookPolicy,
        listener: RecordingListener,
    ) -> Self {
        let directory = Arc::new(directory);
        let listener = Arc::new(listener);
        let cache = InMemoryCacheStore::new();

        let mut bus = EventBus::new();
        bus.subscribe(listener.clone());

        let pipeline = WebhookPipeline::builder(policy)
            .user_fetcher(directory.clone())
            .org_fetcher(directory.clone())
            .dispatcher(Arc::new(bus))
            .cache_store(Arc::new(cache.clone()))
            .build()
            .expect("pipeline should build");

        Self {
            pipeline,
            directory,
            listener,
            cache,
        }
    }
}

pub fn default_policy() -> WebhookPolicy {
    WebhookPolicy::builder()
        .signing_secret(SECRET)
        .build()
        .unwrap()
}
