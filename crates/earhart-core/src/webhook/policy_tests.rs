//! Tests for webhook policy.

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_default_policy_is_secure() {
    let policy = WebhookPolicy::default();

    assert!(policy.verify_signatures());
    assert_eq!(policy.timestamp_tolerance_seconds(), 300);
    assert!(policy.signing_secret().is_none());
    assert!(policy.invalidate_user_list_cache());
    assert!(policy.invalidate_org_list_cache());
    assert!(policy.enrich_events());
    assert!(policy.invalidate_cache());
}

#[test]
fn test_default_invalidation_sets() {
    let policy = WebhookPolicy::default();

    assert_eq!(policy.user_cache_invalidation_events().len(), 9);
    assert!(policy.should_invalidate_user_cache(EventKind::UserLocked));
    assert!(!policy.should_invalidate_user_cache(EventKind::OrgCreated));

    assert!(policy.should_invalidate_org_cache(EventKind::OrgUpdated));
    assert!(policy.should_invalidate_org_cache(EventKind::UserRemovedFromOrg));
    assert!(policy.should_invalidate_org_cache(EventKind::UserRoleChangedWithinOrg));
    assert!(!policy.should_invalidate_org_cache(EventKind::UserLocked));
}

#[test]
fn test_builder_adjusts_sets_and_flags() {
    let policy = WebhookPolicy::builder()
        .remove_user_cache_invalidation_event(EventKind::UserCreated)
        .org_cache_invalidation_events([EventKind::OrgDeleted])
        .invalidate_org_list_cache(false)
        .timestamp_tolerance_seconds(60)
        .signing_secret("whsec_c2VjcmV0")
        .build()
        .expect("valid policy");

    assert!(!policy.should_invalidate_user_cache(EventKind::UserCreated));
    assert!(policy.should_invalidate_org_cache(EventKind::OrgDeleted));
    assert!(!policy.should_invalidate_org_cache(EventKind::OrgCreated));
    assert!(!policy.invalidate_org_list_cache());
    assert_eq!(policy.timestamp_tolerance_seconds(), 60);

    let rebuilt = policy
        .to_builder()
        .add_org_cache_invalidation_event(EventKind::OrgCreated)
        .build()
        .unwrap();
    assert!(rebuilt.should_invalidate_org_cache(EventKind::OrgCreated));
    assert_eq!(rebuilt.timestamp_tolerance_seconds(), 60);
}

#[test]
fn test_builder_rejects_blank_secret() {
    let result = WebhookPolicy::builder().signing_secret("  ").build();
    assert_eq!(result.unwrap_err(), PolicyError::Secret(SecretError::Empty));
}

#[test]
fn test_cache_key_templates_render() {
    let keys = CacheKeyTemplates::default();

    assert_eq!(keys.user_keys("u1"), vec!["user.u1"]);
    assert_eq!(keys.org_keys("o1"), vec!["org.o1", "org.o1.users"]);
    assert_eq!(keys.org_members_key("o1"), "org.o1.members");
}

#[test]
fn test_custom_templates_accept_named_placeholders() {
    let policy = WebhookPolicy::builder()
        .user_cache_key("auth:user:{user_id}")
        .build()
        .unwrap();

    assert_eq!(policy.cache_keys().user_keys("u1"), vec!["auth:user:u1"]);
}

#[test]
fn test_validation_rejects_bad_templates() {
    let result = WebhookPolicy::builder()
        .user_cache_key("user.static")
        .org_cache_key("org.{user_id}")
        .build();

    match result {
        Err(PolicyError::ValidationError { errors }) => {
            assert_eq!(errors.len(), 2, "errors: {:?}", errors);
            assert!(errors[0].contains("cache_keys.user"));
            assert!(errors[1].contains("{user_id}"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_summary_masks_secret() {
    let policy = WebhookPolicy::builder()
        .signing_secret("whsec_super_secret_value")
        .build()
        .unwrap();

    let summary = policy.summary();
    let json = serde_json::to_string(&summary).unwrap();

    assert_eq!(summary.signing_secret.as_deref(), Some("***"));
    assert!(!json.contains("super_secret"));
    assert!(!format!("{:?}", policy).contains("super_secret"));
    assert!(summary
        .user_cache_invalidation_events
        .contains(&"user.created".to_string()));
}

#[test]
fn test_summary_without_secret_is_none() {
    assert_eq!(WebhookPolicy::default().summary().signing_secret, None);
}

#[test]
fn test_load_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        r#"
user_cache_invalidation_events:
  - user.updated
  - user.deleted
invalidate_user_list_cache: false
signing_secret: "whsec_c2VjcmV0"
timestamp_tolerance_seconds: 120
cache_keys:
  user: "cache:user:{{id}}"
"#
    )
    .unwrap();

    let policy = WebhookPolicy::load_from_file(file.path()).expect("valid policy file");

    assert_eq!(policy.user_cache_invalidation_events().len(), 2);
    assert!(!policy.invalidate_user_list_cache());
    assert_eq!(policy.timestamp_tolerance_seconds(), 120);
    assert_eq!(policy.cache_keys().user, "cache:user:{id}");
    // Unspecified fields keep their defaults
    assert_eq!(policy.cache_keys().org, "org.{id}");
    assert!(policy.verify_signatures());
    assert_eq!(
        policy.signing_secret().map(|s| s.expose_secret()),
        Some("whsec_c2VjcmV0")
    );
}

#[test]
fn test_load_from_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"verify_signatures": false, "enrich_events": false}}"#
    )
    .unwrap();

    let policy = WebhookPolicy::load_from_file(file.path()).unwrap();

    assert!(!policy.verify_signatures());
    assert!(!policy.enrich_events());
}

#[test]
fn test_load_rejects_unknown_event_kind() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"user_cache_invalidation_events": ["user.login"]}}"#
    )
    .unwrap();

    let result = WebhookPolicy::load_from_file(file.path());
    assert!(matches!(result, Err(PolicyError::ParseError { .. })));
}

#[test]
fn test_load_missing_file() {
    let result = WebhookPolicy::load_from_file(Path::new("/nonexistent/policy.yaml"));
    assert!(matches!(result, Err(PolicyError::FileNotFound { .. })));
}
