//! Typed identity-provider events.
//!
//! Each supported `event_type` discriminator maps to exactly one [`EventKind`]
//! and one payload struct. Payload structs list only the fields the provider
//! guarantees for that kind; anything else in the body is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Event Kinds
// ============================================================================

/// Discriminator of a supported event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "org.created")]
    OrgCreated,
    #[serde(rename = "org.updated")]
    OrgUpdated,
    #[serde(rename = "org.deleted")]
    OrgDeleted,
    #[serde(rename = "user.added_to_org")]
    UserAddedToOrg,
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.deleted")]
    UserDeleted,
    #[serde(rename = "user.disabled")]
    UserDisabled,
    #[serde(rename = "user.enabled")]
    UserEnabled,
    #[serde(rename = "user.locked")]
    UserLocked,
    #[serde(rename = "user.removed_from_org")]
    UserRemovedFromOrg,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "user.role_changed_within_org")]
    UserRoleChangedWithinOrg,
}

impl EventKind {
    /// Every supported kind, in discriminator order
    pub const ALL: [EventKind; 12] = [
        EventKind::OrgCreated,
        EventKind::OrgUpdated,
        EventKind::OrgDeleted,
        EventKind::UserAddedToOrg,
        EventKind::UserCreated,
        EventKind::UserDeleted,
        EventKind::UserDisabled,
        EventKind::UserEnabled,
        EventKind::UserLocked,
        EventKind::UserRemovedFromOrg,
        EventKind::UserUpdated,
        EventKind::UserRoleChangedWithinOrg,
    ];

    /// Provider event types that are recognised but deliberately not modelled
    ///
    /// Deliveries with these discriminators finish as unsupported.
    pub const KNOWN_UNMODELED: [&'static str; 17] = [
        "org.api_key_deleted",
        "org.saml_removed",
        "org.saml_setup",
        "org.saml_went_live",
        "org.scim_group_created",
        "org.scim_group_deleted",
        "org.scim_group_updated",
        "org.scim_key_created",
        "org.scim_key_revoked",
        "user.added_to_scim_group",
        "user.deleted_personal_api_key",
        "user.impersonated",
        "user.invited_to_org",
        "user.logged_out",
        "user.login",
        "user.removed_from_scim_group",
        "user.send_mfa_phone_code",
    ];

    /// Wire discriminator for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrgCreated => "org.created",
            EventKind::OrgUpdated => "org.updated",
            EventKind::OrgDeleted => "org.deleted",
            EventKind::UserAddedToOrg => "user.added_to_org",
            EventKind::UserCreated => "user.created",
            EventKind::UserDeleted => "user.deleted",
            EventKind::UserDisabled => "user.disabled",
            EventKind::UserEnabled => "user.enabled",
            EventKind::UserLocked => "user.locked",
            EventKind::UserRemovedFromOrg => "user.removed_from_org",
            EventKind::UserUpdated => "user.updated",
            EventKind::UserRoleChangedWithinOrg => "user.role_changed_within_org",
        }
    }

    /// True for a recognised provider type this crate does not model
    pub fn is_known_unmodeled(event_type: &str) -> bool {
        Self::KNOWN_UNMODELED.contains(&event_type)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a discriminator is not a supported kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported event type: '{0}'")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgCreated {
    pub org_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUpdated {
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDeleted {
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddedToOrg {
    pub user_id: String,
    pub org_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: String,
    pub email: String,
    pub email_confirmed: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A deleted user
///
/// `org_ids` lists the organisations the user belonged to when the provider
/// includes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: String,
    #[serde(default)]
    pub org_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisabled {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEnabled {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLocked {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemovedFromOrg {
    pub removed_user_id: String,
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleChangedWithinOrg {
    pub user_id: String,
    pub org_id: String,
    pub new_role: String,
}

// ============================================================================
// Event
// ============================================================================

/// A verified, typed identity-provider event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type")]
pub enum Event {
    #[serde(rename = "org.created")]
    OrgCreated(OrgCreated),
    #[serde(rename = "org.updated")]
    OrgUpdated(OrgUpdated),
    #[serde(rename = "org.deleted")]
    OrgDeleted(OrgDeleted),
    #[serde(rename = "user.added_to_org")]
    UserAddedToOrg(UserAddedToOrg),
    #[serde(rename = "user.created")]
    UserCreated(UserCreated),
    #[serde(rename = "user.deleted")]
    UserDeleted(UserDeleted),
    #[serde(rename = "user.disabled")]
    UserDisabled(UserDisabled),
    #[serde(rename = "user.enabled")]
    UserEnabled(UserEnabled),
    #[serde(rename = "user.locked")]
    UserLocked(UserLocked),
    #[serde(rename = "user.removed_from_org")]
    UserRemovedFromOrg(UserRemovedFromOrg),
    #[serde(rename = "user.updated")]
    UserUpdated(UserUpdated),
    #[serde(rename = "user.role_changed_within_org")]
    UserRoleChangedWithinOrg(UserRoleChangedWithinOrg),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OrgCreated(_) => EventKind::OrgCreated,
            Event::OrgUpdated(_) => EventKind::OrgUpdated,
            Event::OrgDeleted(_) => EventKind::OrgDeleted,
            Event::UserAddedToOrg(_) => EventKind::UserAddedToOrg,
            Event::UserCreated(_) => EventKind::UserCreated,
            Event::UserDeleted(_) => EventKind::UserDeleted,
            Event::UserDisabled(_) => EventKind::UserDisabled,
            Event::UserEnabled(_) => EventKind::UserEnabled,
            Event::UserLocked(_) => EventKind::UserLocked,
            Event::UserRemovedFromOrg(_) => EventKind::UserRemovedFromOrg,
            Event::UserUpdated(_) => EventKind::UserUpdated,
            Event::UserRoleChangedWithinOrg(_) => EventKind::UserRoleChangedWithinOrg,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// The user this event is about, if any
    ///
    /// Empty identifiers are treated as absent.
    pub fn subject_user_id(&self) -> Option<&str> {
        let id = match self {
            Event::UserAddedToOrg(e) => &e.user_id,
            Event::UserCreated(e) => &e.user_id,
            Event::UserDeleted(e) => &e.user_id,
            Event::UserDisabled(e) => &e.user_id,
            Event::UserEnabled(e) => &e.user_id,
            Event::UserLocked(e) => &e.user_id,
            Event::UserRemovedFromOrg(e) => &e.removed_user_id,
            Event::UserUpdated(e) => &e.user_id,
            Event::UserRoleChangedWithinOrg(e) => &e.user_id,
            Event::OrgCreated(_) | Event::OrgUpdated(_) | Event::OrgDeleted(_) => return None,
        };
        non_empty(id)
    }

    /// The organisation this event is about, if any
    pub fn subject_org_id(&self) -> Option<&str> {
        let id = match self {
            Event::OrgCreated(e) => &e.org_id,
            Event::OrgUpdated(e) => &e.org_id,
            Event::OrgDeleted(e) => &e.org_id,
            Event::UserAddedToOrg(e) => &e.org_id,
            Event::UserRemovedFromOrg(e) => &e.org_id,
            Event::UserRoleChangedWithinOrg(e) => &e.org_id,
            Event::UserCreated(_)
            | Event::UserDeleted(_)
            | Event::UserDisabled(_)
            | Event::UserEnabled(_)
            | Event::UserLocked(_)
            | Event::UserUpdated(_) => return None,
        };
        non_empty(id)
    }
}

fn non_empty(id: &str) -> Option<&str> {
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
