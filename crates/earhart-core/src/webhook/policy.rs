//! Webhook processing policy.
//!
//! A [`WebhookPolicy`] decides which events invalidate which cache scopes,
//! how cache keys are spelled, and how strictly deliveries are verified.
//! Policies are secure by default: signatures are mandatory and timestamps
//! must lie within five minutes of the receive time.

use super::events::EventKind;
use super::signature::{SecretError, SigningSecret};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Default replay window in seconds
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECONDS: u64 = 300;

const PLACEHOLDER_PATTERN: &str = r"\{([^{}]*)\}";

// ============================================================================
// Cache Key Templates
// ============================================================================

/// Spelling of the cache keys the invalidator forgets
///
/// Entity templates take a placeholder: `{id}` or `{user_id}` for user keys,
/// `{id}` or `{org_id}` for organisation keys. List keys are literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheKeyTemplates {
    pub user: String,
    pub org: String,
    /// Extra keys cleared whenever a user is invalidated
    pub user_dependents: Vec<String>,
    /// Extra keys cleared whenever an organisation is invalidated
    pub org_dependents: Vec<String>,
    pub org_members: String,
    pub user_list: String,
    pub org_list: String,
}

impl Default for CacheKeyTemplates {
    fn default() -> Self {
        Self {
            user: "user.{id}".to_string(),
            org: "org.{id}".to_string(),
            user_dependents: Vec::new(),
            org_dependents: vec!["org.{org_id}.users".to_string()],
            org_members: "org.{org_id}.members".to_string(),
            user_list: "users.list".to_string(),
            org_list: "orgs.list".to_string(),
        }
    }
}

impl CacheKeyTemplates {
    /// Entity key followed by its dependents
    pub fn user_keys(&self, user_id: &str) -> Vec<String> {
        std::iter::once(&self.user)
            .chain(&self.user_dependents)
            .map(|template| render(template, "user_id", user_id))
            .collect()
    }

    /// Entity key followed by its dependents
    pub fn org_keys(&self, org_id: &str) -> Vec<String> {
        std::iter::once(&self.org)
            .chain(&self.org_dependents)
            .map(|template| render(template, "org_id", org_id))
            .collect()
    }

    pub fn org_members_key(&self, org_id: &str) -> String {
        render(&self.org_members, "org_id", org_id)
    }

    fn validate(&self, errors: &mut Vec<String>) -> Result<(), PolicyError> {
        let placeholder =
            regex::Regex::new(PLACEHOLDER_PATTERN).map_err(|e| PolicyError::ParseError {
                message: format!("Invalid placeholder pattern: {}", e),
            })?;

        let user_templates = std::iter::once(("user", &self.user))
            .chain(self.user_dependents.iter().map(|t| ("user_dependents", t)));
        for (field, template) in user_templates {
            check_entity_template(&placeholder, field, template, "user_id", errors);
        }

        let org_templates = [("org", &self.org), ("org_members", &self.org_members)]
            .into_iter()
            .chain(self.org_dependents.iter().map(|t| ("org_dependents", t)));
        for (field, template) in org_templates {
            check_entity_template(&placeholder, field, template, "org_id", errors);
        }

        for (field, template) in [("user_list", &self.user_list), ("org_list", &self.org_list)] {
            if template.trim().is_empty() {
                errors.push(format!("cache_keys.{} must not be empty", field));
            } else if placeholder.is_match(template) {
                errors.push(format!(
                    "cache_keys.{} must not contain placeholders: '{}'",
                    field, template
                ));
            }
        }

        Ok(())
    }
}

fn check_entity_template(
    placeholder: &regex::Regex,
    field: &str,
    template: &str,
    named: &str,
    errors: &mut Vec<String>,
) {
    let names: Vec<&str> = placeholder
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    if names.is_empty() {
        errors.push(format!(
            "cache_keys.{} must contain {{id}} or {{{}}}: '{}'",
            field, named, template
        ));
    }

    for name in names {
        if name != "id" && name != named {
            errors.push(format!(
                "cache_keys.{} uses unknown placeholder {{{}}}",
                field, name
            ));
        }
    }
}

fn render(template: &str, named: &str, id: &str) -> String {
    template
        .replace("{id}", id)
        .replace(&format!("{{{}}}", named), id)
}

// ============================================================================
// Policy
// ============================================================================

/// Policy applied to every delivery a pipeline processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookPolicy {
    user_cache_invalidation_events: BTreeSet<EventKind>,
    org_cache_invalidation_events: BTreeSet<EventKind>,
    invalidate_user_list_cache: bool,
    invalidate_org_list_cache: bool,
    cache_keys: CacheKeyTemplates,
    verify_signatures: bool,
    #[serde(skip_serializing)]
    signing_secret: Option<SigningSecret>,
    timestamp_tolerance_seconds: u64,
    enrich_events: bool,
    invalidate_cache: bool,
}

impl Default for WebhookPolicy {
    fn default() -> Self {
        Self {
            user_cache_invalidation_events: BTreeSet::from([
                EventKind::UserCreated,
                EventKind::UserUpdated,
                EventKind::UserDeleted,
                EventKind::UserDisabled,
                EventKind::UserEnabled,
                EventKind::UserLocked,
                EventKind::UserAddedToOrg,
                EventKind::UserRemovedFromOrg,
                EventKind::UserRoleChangedWithinOrg,
            ]),
            // User events with org-side invalidations are listed here too
            org_cache_invalidation_events: BTreeSet::from([
                EventKind::OrgCreated,
                EventKind::OrgUpdated,
                EventKind::OrgDeleted,
                EventKind::UserAddedToOrg,
                EventKind::UserRemovedFromOrg,
                EventKind::UserRoleChangedWithinOrg,
                EventKind::UserDeleted,
            ]),
            invalidate_user_list_cache: true,
            invalidate_org_list_cache: true,
            cache_keys: CacheKeyTemplates::default(),
            verify_signatures: true,
            signing_secret: None,
            timestamp_tolerance_seconds: DEFAULT_TIMESTAMP_TOLERANCE_SECONDS,
            enrich_events: true,
            invalidate_cache: true,
        }
    }
}

impl WebhookPolicy {
    pub fn builder() -> WebhookPolicyBuilder {
        WebhookPolicyBuilder::new()
    }

    /// Start a builder from this policy's values
    pub fn to_builder(&self) -> WebhookPolicyBuilder {
        WebhookPolicyBuilder {
            policy: self.clone(),
        }
    }

    /// Load a policy from a YAML or JSON file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, PolicyError> {
        if !path.exists() {
            return Err(PolicyError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| PolicyError::ParseError {
            message: format!("Failed to read file: {}", e),
        })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let policy: WebhookPolicy = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| PolicyError::ParseError {
                    message: format!("Invalid YAML: {}", e),
                })?
            }
            "json" => serde_json::from_str(&contents).map_err(|e| PolicyError::ParseError {
                message: format!("Invalid JSON: {}", e),
            })?,
            _ => serde_json::from_str(&contents)
                .or_else(|_| serde_yaml::from_str(&contents))
                .map_err(|e| PolicyError::ParseError {
                    message: format!("Failed to parse as JSON or YAML: {}", e),
                })?,
        };

        policy.validate()?;
        Ok(policy)
    }

    /// Check cache-key templates and the signing secret
    pub fn validate(&self) -> Result<(), PolicyError> {
        if let Some(secret) = &self.signing_secret {
            if secret.is_blank() {
                return Err(PolicyError::Secret(SecretError::Empty));
            }
        }

        let mut errors = Vec::new();
        self.cache_keys.validate(&mut errors)?;

        if !errors.is_empty() {
            return Err(PolicyError::ValidationError { errors });
        }

        Ok(())
    }

    pub fn should_invalidate_user_cache(&self, kind: EventKind) -> bool {
        self.user_cache_invalidation_events.contains(&kind)
    }

    pub fn should_invalidate_org_cache(&self, kind: EventKind) -> bool {
        self.org_cache_invalidation_events.contains(&kind)
    }

    pub fn user_cache_invalidation_events(&self) -> &BTreeSet<EventKind> {
        &self.user_cache_invalidation_events
    }

    pub fn org_cache_invalidation_events(&self) -> &BTreeSet<EventKind> {
        &self.org_cache_invalidation_events
    }

    pub fn invalidate_user_list_cache(&self) -> bool {
        self.invalidate_user_list_cache
    }

    pub fn invalidate_org_list_cache(&self) -> bool {
        self.invalidate_org_list_cache
    }

    pub fn cache_keys(&self) -> &CacheKeyTemplates {
        &self.cache_keys
    }

    pub fn verify_signatures(&self) -> bool {
        self.verify_signatures
    }

    pub fn signing_secret(&self) -> Option<&SigningSecret> {
        self.signing_secret.as_ref()
    }

    pub fn timestamp_tolerance_seconds(&self) -> u64 {
        self.timestamp_tolerance_seconds
    }

    pub fn enrich_events(&self) -> bool {
        self.enrich_events
    }

    pub fn invalidate_cache(&self) -> bool {
        self.invalidate_cache
    }

    /// Printable view of the policy with the signing secret masked
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            user_cache_invalidation_events: kinds_to_strings(&self.user_cache_invalidation_events),
            org_cache_invalidation_events: kinds_to_strings(&self.org_cache_invalidation_events),
            invalidate_user_list_cache: self.invalidate_user_list_cache,
            invalidate_org_list_cache: self.invalidate_org_list_cache,
            cache_keys: self.cache_keys.clone(),
            verify_signatures: self.verify_signatures,
            signing_secret: self.signing_secret.as_ref().map(|_| "***".to_string()),
            timestamp_tolerance_seconds: self.timestamp_tolerance_seconds,
            enrich_events: self.enrich_events,
            invalidate_cache: self.invalidate_cache,
        }
    }
}

fn kinds_to_strings(kinds: &BTreeSet<EventKind>) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

/// Serializable policy view safe for logs and operator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySummary {
    pub user_cache_invalidation_events: Vec<String>,
    pub org_cache_invalidation_events: Vec<String>,
    pub invalidate_user_list_cache: bool,
    pub invalidate_org_list_cache: bool,
    pub cache_keys: CacheKeyTemplates,
    pub verify_signatures: bool,
    pub signing_secret: Option<String>,
    pub timestamp_tolerance_seconds: u64,
    pub enrich_events: bool,
    pub invalidate_cache: bool,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`WebhookPolicy`], starting from the defaults
#[derive(Debug, Clone, Default)]
pub struct WebhookPolicyBuilder {
    policy: WebhookPolicy,
}

impl WebhookPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the user-scope invalidation set
    pub fn user_cache_invalidation_events(
        mut self,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> Self {
        self.policy.user_cache_invalidation_events = kinds.into_iter().collect();
        self
    }

    pub fn add_user_cache_invalidation_event(mut self, kind: EventKind) -> Self {
        self.policy.user_cache_invalidation_events.insert(kind);
        self
    }

    pub fn remove_user_cache_invalidation_event(mut self, kind: EventKind) -> Self {
        self.policy.user_cache_invalidation_events.remove(&kind);
        self
    }

    /// Replace the organisation-scope invalidation set
    pub fn org_cache_invalidation_events(
        mut self,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> Self {
        self.policy.org_cache_invalidation_events = kinds.into_iter().collect();
        self
    }

    pub fn add_org_cache_invalidation_event(mut self, kind: EventKind) -> Self {
        self.policy.org_cache_invalidation_events.insert(kind);
        self
    }

    pub fn remove_org_cache_invalidation_event(mut self, kind: EventKind) -> Self {
        self.policy.org_cache_invalidation_events.remove(&kind);
        self
    }

    pub fn invalidate_user_list_cache(mut self, enabled: bool) -> Self {
        self.policy.invalidate_user_list_cache = enabled;
        self
    }

    pub fn invalidate_org_list_cache(mut self, enabled: bool) -> Self {
        self.policy.invalidate_org_list_cache = enabled;
        self
    }

    pub fn cache_keys(mut self, templates: CacheKeyTemplates) -> Self {
        self.policy.cache_keys = templates;
        self
    }

    pub fn user_cache_key(mut self, template: impl Into<String>) -> Self {
        self.policy.cache_keys.user = template.into();
        self
    }

    pub fn org_cache_key(mut self, template: impl Into<String>) -> Self {
        self.policy.cache_keys.org = template.into();
        self
    }

    pub fn verify_signatures(mut self, enabled: bool) -> Self {
        self.policy.verify_signatures = enabled;
        self
    }

    pub fn signing_secret(mut self, secret: impl Into<SigningSecret>) -> Self {
        self.policy.signing_secret = Some(secret.into());
        self
    }

    pub fn timestamp_tolerance_seconds(mut self, seconds: u64) -> Self {
        self.policy.timestamp_tolerance_seconds = seconds;
        self
    }

    pub fn enrich_events(mut self, enabled: bool) -> Self {
        self.policy.enrich_events = enabled;
        self
    }

    pub fn invalidate_cache(mut self, enabled: bool) -> Self {
        self.policy.invalidate_cache = enabled;
        self
    }

    /// Validate and return the policy
    pub fn build(self) -> Result<WebhookPolicy, PolicyError> {
        self.policy.validate()?;
        Ok(self.policy)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Policy loading and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Policy file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse policy: {message}")]
    ParseError { message: String },

    #[error("Policy validation failed: {}", .errors.join("; "))]
    ValidationError { errors: Vec<String> },

    #[error("Signature verification is enabled but no signing secret is configured")]
    MissingSigningSecret,

    #[error("Pipeline component not configured: {component}")]
    MissingComponent { component: String },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
