//! Policy-driven cache invalidation.
//!
//! Each event kind maps to a fixed set of [`Invalidation`] actions. The
//! policy gates the actions and spells the concrete cache keys; the
//! [`CacheStore`] forgets them.

use super::cache::{CacheError, CacheStore};
use super::events::{Event, EventKind};
use super::policy::WebhookPolicy;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// One cache scope to clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// A user's entity key and its dependents
    User(String),
    /// An organisation's entity key and its dependents
    Org(String),
    /// An organisation's membership listing
    OrgMembers(String),
    UserList,
    OrgList,
}

impl Invalidation {
    fn is_user_side(&self) -> bool {
        matches!(self, Self::User(_) | Self::UserList)
    }
}

/// Clears the cache entries an event made stale
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
    policy: Arc<WebhookPolicy>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>, policy: Arc<WebhookPolicy>) -> Self {
        Self { store, policy }
    }

    /// Actions for `event` after policy gating
    pub fn plan(&self, event: &Event) -> Vec<Invalidation> {
        let kind = event.kind();
        rules(event)
            .into_iter()
            .filter(|action| self.allows(kind, action))
            .collect()
    }

    /// Concrete keys for `event`, in order and without duplicates
    pub fn cache_keys(&self, event: &Event) -> Vec<String> {
        let templates = self.policy.cache_keys();
        let mut keys: Vec<String> = Vec::new();

        for action in self.plan(event) {
            let expanded = match action {
                Invalidation::User(id) => templates.user_keys(&id),
                Invalidation::Org(id) => templates.org_keys(&id),
                Invalidation::OrgMembers(id) => vec![templates.org_members_key(&id)],
                Invalidation::UserList => vec![templates.user_list.clone()],
                Invalidation::OrgList => vec![templates.org_list.clone()],
            };
            for key in expanded {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        keys
    }

    /// Forget every key the event made stale
    ///
    /// Every key is attempted even after a failure. Returns the keys that
    /// were forgotten.
    #[instrument(skip(self, event), fields(event_type = %event.event_type()))]
    pub async fn handle(&self, event: &Event) -> Result<Vec<String>, InvalidationError> {
        let keys = self.cache_keys(event);
        if keys.is_empty() {
            debug!("No cache keys to invalidate");
            return Ok(keys);
        }

        let mut forgotten = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();

        for key in keys {
            match self.store.forget(&key).await {
                Ok(_) => forgotten.push(key),
                Err(error) => {
                    warn!(key = %key, error = %error, "Failed to forget cache key");
                    failures.push(KeyFailure { key, error });
                }
            }
        }

        if failures.is_empty() {
            debug!(count = forgotten.len(), "Cache keys invalidated");
            Ok(forgotten)
        } else {
            Err(InvalidationError { failures })
        }
    }

    fn allows(&self, kind: EventKind, action: &Invalidation) -> bool {
        if action.is_user_side() {
            if !self.policy.should_invalidate_user_cache(kind) {
                return false;
            }
        } else if !self.policy.should_invalidate_org_cache(kind) {
            return false;
        }

        match action {
            Invalidation::UserList => self.policy.invalidate_user_list_cache(),
            Invalidation::OrgList => self.policy.invalidate_org_list_cache(),
            _ => true,
        }
    }
}

/// Ungated actions per event kind
fn rules(event: &Event) -> Vec<Invalidation> {
    let user = event.subject_user_id().map(|id| Invalidation::User(id.to_string()));
    let org = event.subject_org_id().map(|id| Invalidation::Org(id.to_string()));
    let members = event
        .subject_org_id()
        .map(|id| Invalidation::OrgMembers(id.to_string()));

    match event {
        Event::UserCreated(_) => vec![Invalidation::UserList],
        Event::UserUpdated(_) => user.into_iter().chain([Invalidation::UserList]).collect(),
        Event::UserDeleted(deleted) => {
            let Some(user) = user else {
                return Vec::new();
            };
            let orgs = deleted
                .org_ids
                .iter()
                .filter(|id| !id.is_empty())
                .map(|id| Invalidation::Org(id.clone()));
            [user, Invalidation::UserList].into_iter().chain(orgs).collect()
        }
        Event::UserEnabled(_) | Event::UserDisabled(_) | Event::UserLocked(_) => {
            user.into_iter().collect()
        }
        Event::UserAddedToOrg(_) | Event::UserRemovedFromOrg(_) => {
            user.into_iter().chain(org).chain(members).collect()
        }
        Event::UserRoleChangedWithinOrg(_) => user.into_iter().chain(org).collect(),
        Event::OrgCreated(_) => vec![Invalidation::OrgList],
        Event::OrgUpdated(_) | Event::OrgDeleted(_) => {
            org.into_iter().chain([Invalidation::OrgList]).collect()
        }
    }
}

/// A key the store failed to forget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    pub key: String,
    pub error: CacheError,
}

/// One or more keys could not be forgotten
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to forget {} cache key(s): {}", .failures.len(), describe(.failures))]
pub struct InvalidationError {
    pub failures: Vec<KeyFailure>,
}

impl InvalidationError {
    pub fn is_transient(&self) -> bool {
        self.failures.iter().all(|f| f.error.is_transient())
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }
}

fn describe(failures: &[KeyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.key, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "invalidator_tests.rs"]
mod tests;
