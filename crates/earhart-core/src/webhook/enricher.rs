//! Per-run event enrichment.
//!
//! An [`EventEnricher`] lives for one pipeline run. It loads the subject user
//! and organisation of an event at most once per id and hands out shared
//! handles to the loaded snapshots.

use super::entities::{FetchError, Freshness, OrgFetcher, OrgSnapshot, UserFetcher, UserSnapshot};
use super::events::Event;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Snapshots loaded for one event
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub user: Option<Arc<UserSnapshot>>,
    pub org: Option<Arc<OrgSnapshot>>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.org.is_none()
    }
}

/// Loads and memoizes entity snapshots for one run
pub struct EventEnricher {
    users: Arc<dyn UserFetcher>,
    orgs: Arc<dyn OrgFetcher>,
    user_cache: HashMap<String, Arc<UserSnapshot>>,
    org_cache: HashMap<String, Arc<OrgSnapshot>>,
}

impl EventEnricher {
    pub fn new(users: Arc<dyn UserFetcher>, orgs: Arc<dyn OrgFetcher>) -> Self {
        Self {
            users,
            orgs,
            user_cache: HashMap::new(),
            org_cache: HashMap::new(),
        }
    }

    /// Load the subject user and organisation of `event`
    ///
    /// Ids the event does not carry are skipped. The first fetch failure is
    /// returned; snapshots loaded before it stay memoized.
    #[instrument(skip(self, event), fields(event_type = %event.event_type()))]
    pub async fn enrich(&mut self, event: &Event) -> Result<Enrichment, EnrichmentError> {
        let user = match event.subject_user_id() {
            Some(user_id) => Some(self.user_snapshot(user_id).await?),
            None => None,
        };

        let org = match event.subject_org_id() {
            Some(org_id) => Some(self.org_snapshot(org_id).await?),
            None => None,
        };

        Ok(Enrichment { user, org })
    }

    /// Fresh user snapshot, fetched at most once per id in this run
    pub async fn user_snapshot(&mut self, user_id: &str) -> Result<Arc<UserSnapshot>, EnrichmentError> {
        if let Some(snapshot) = self.user_cache.get(user_id) {
            return Ok(Arc::clone(snapshot));
        }

        debug!(user_id = %user_id, "Fetching user snapshot");
        let snapshot = self
            .users
            .fetch_user(user_id, Freshness::Fresh)
            .await
            .map_err(|source| EnrichmentError::User {
                user_id: user_id.to_string(),
                source,
            })?;

        let snapshot = Arc::new(snapshot);
        self.user_cache
            .insert(user_id.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Fresh organisation snapshot, fetched at most once per id in this run
    pub async fn org_snapshot(&mut self, org_id: &str) -> Result<Arc<OrgSnapshot>, EnrichmentError> {
        if let Some(snapshot) = self.org_cache.get(org_id) {
            return Ok(Arc::clone(snapshot));
        }

        debug!(org_id = %org_id, "Fetching organisation snapshot");
        let snapshot = self
            .orgs
            .fetch_org(org_id, Freshness::Fresh)
            .await
            .map_err(|source| EnrichmentError::Org {
                org_id: org_id.to_string(),
                source,
            })?;

        let snapshot = Arc::new(snapshot);
        self.org_cache.insert(org_id.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn cached_user_count(&self) -> usize {
        self.user_cache.len()
    }

    pub fn cached_org_count(&self) -> usize {
        self.org_cache.len()
    }

    pub fn clear_all(&mut self) {
        self.user_cache.clear();
        self.org_cache.clear();
    }

    pub fn clear_user(&mut self, user_id: &str) {
        self.user_cache.remove(user_id);
    }

    pub fn clear_org(&mut self, org_id: &str) {
        self.org_cache.remove(org_id);
    }
}

/// Snapshot load failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    #[error("could not load user '{user_id}': {source}")]
    User {
        user_id: String,
        #[source]
        source: FetchError,
    },

    #[error("could not load organisation '{org_id}': {source}")]
    Org {
        org_id: String,
        #[source]
        source: FetchError,
    },
}

impl EnrichmentError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::User { source, .. } | Self::Org { source, .. } => source.is_transient(),
        }
    }
}

#[cfg(test)]
#[path = "enricher_tests.rs"]
mod tests;
