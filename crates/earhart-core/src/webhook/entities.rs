//! User and organisation snapshots, and the capabilities that fetch them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Snapshots
// ============================================================================

/// Full user record as returned by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: String,
    pub email: String,
    pub email_confirmed: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub picture_url: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub locked: bool,
    pub enabled: bool,
    #[serde(default)]
    pub has_password: bool,
    #[serde(default)]
    pub update_password_required: bool,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub can_create_orgs: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_active_at: DateTime<Utc>,
}

impl UserSnapshot {
    /// Enabled and not locked
    pub fn is_active(&self) -> bool {
        self.enabled && !self.locked
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Full organisation record as returned by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSnapshot {
    pub org_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub url_safe_org_slug: Option<String>,
    #[serde(default)]
    pub can_setup_saml: Option<bool>,
    #[serde(default)]
    pub is_saml_configured: bool,
    #[serde(default)]
    pub is_saml_in_test_mode: Option<bool>,
    #[serde(default)]
    pub extra_domains: Option<Vec<String>>,
    #[serde(default)]
    pub domain_autojoin: Option<bool>,
    #[serde(default)]
    pub domain_restrict: Option<bool>,
    #[serde(default = "default_role_mapping")]
    pub custom_role_mapping_name: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub max_org_members: Option<u32>,
}

fn default_role_mapping() -> String {
    "default".to_string()
}

impl OrgSnapshot {
    /// True when the organisation has a member cap and `count` reaches it
    pub fn is_at_member_limit(&self, count: u32) -> bool {
        self.max_org_members.is_some_and(|max| count >= max)
    }
}

// ============================================================================
// Fetch Capabilities
// ============================================================================

/// Whether a fetch may be served from a read-through cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Cached,
    /// Bypass any cache and load from the provider
    Fresh,
}

/// Loads user snapshots from the identity provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserFetcher: Send + Sync {
    async fn fetch_user(
        &self,
        user_id: &str,
        freshness: Freshness,
    ) -> Result<UserSnapshot, FetchError>;
}

/// Loads organisation snapshots from the identity provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrgFetcher: Send + Sync {
    async fn fetch_org(&self, org_id: &str, freshness: Freshness)
        -> Result<OrgSnapshot, FetchError>;
}

/// Errors raised by fetchers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Rate limited by identity provider, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Identity provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid response from identity provider: {message}")]
    InvalidResponse { message: String },
}

impl FetchError {
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "User".to_string(),
            id: id.into(),
        }
    }

    pub fn org_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Organisation".to_string(),
            id: id.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }
}

#[cfg(test)]
#[path = "entities_tests.rs"]
mod tests;
