//! Tests for entity snapshots.

use super::*;
use serde_json::json;

#[test]
fn test_user_snapshot_deserializes_provider_record() {
    let user: UserSnapshot = serde_json::from_value(json!({
        "user_id": "u1",
        "email": "amelia@example.com",
        "email_confirmed": true,
        "first_name": "Amelia",
        "last_name": "Earhart",
        "picture_url": "https://img.example.com/u1.png",
        "properties": {"plan": "pro"},
        "locked": false,
        "enabled": true,
        "has_password": true,
        "update_password_required": false,
        "mfa_enabled": true,
        "can_create_orgs": false,
        "created_at": 1_700_000_000,
        "last_active_at": 1_700_000_500
    }))
    .expect("valid user record");

    assert_eq!(user.full_name(), "Amelia Earhart");
    assert!(user.is_active());
    assert_eq!(user.username, None);
    assert_eq!(user.created_at.timestamp(), 1_700_000_000);
    assert_eq!(user.properties["plan"], "pro");
}

#[test]
fn test_user_snapshot_is_inactive_when_locked_or_disabled() {
    let mut user: UserSnapshot = serde_json::from_value(json!({
        "user_id": "u1",
        "email": "a@b.c",
        "email_confirmed": false,
        "locked": true,
        "enabled": true,
        "created_at": 0,
        "last_active_at": 0
    }))
    .unwrap();
    assert!(!user.is_active());

    user.locked = false;
    user.enabled = false;
    assert!(!user.is_active());
}

#[test]
fn test_org_snapshot_maps_camel_case_and_defaults() {
    let org: OrgSnapshot = serde_json::from_value(json!({
        "orgId": "o1",
        "name": "Acme",
        "isSamlConfigured": true,
        "maxOrgMembers": 10
    }))
    .expect("valid org record");

    assert_eq!(org.org_id, "o1");
    assert_eq!(org.display_name, "Acme");
    assert!(org.is_saml_configured);
    assert_eq!(org.custom_role_mapping_name, "default");
    assert_eq!(org.created_at, None);
    assert!(org.is_at_member_limit(10));
    assert!(!org.is_at_member_limit(9));
}

#[test]
fn test_fetch_error_transience() {
    assert!(!FetchError::user_not_found("u1").is_transient());
    assert!(FetchError::RateLimited {
        retry_after_seconds: 5
    }
    .is_transient());
    assert_eq!(
        FetchError::org_not_found("o1").to_string(),
        "Organisation not found: o1"
    );
}
