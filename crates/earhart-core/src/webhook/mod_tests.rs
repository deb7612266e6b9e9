//! Tests for webhook processing module.

use super::*;

#[test]
fn test_headers_lookup_ignores_case() {
    let mut raw = HashMap::new();
    raw.insert("Svix-Id".to_string(), "msg_1".to_string());
    raw.insert("SVIX-TIMESTAMP".to_string(), "1700000000".to_string());

    let headers = WebhookHeaders::from_map(&raw);

    assert_eq!(headers.get("svix-id"), Some("msg_1"));
    assert_eq!(headers.get("svix-timestamp"), Some("1700000000"));
    assert_eq!(headers.len(), 2);
}

#[test]
fn test_headers_get_any_prefers_first_name() {
    let headers: WebhookHeaders = [("webhook-id", "fallback"), ("svix-id", "primary")]
        .into_iter()
        .collect();

    assert_eq!(headers.get_any(&["svix-id", "webhook-id"]), Some("primary"));
    assert_eq!(headers.get_any(&["webhook-id"]), Some("fallback"));
    assert_eq!(headers.get_any(&["x-missing"]), None);
}

#[test]
fn test_envelope_exposes_signing_headers() {
    let headers: WebhookHeaders = [
        ("webhook-id", "msg_2"),
        ("webhook-timestamp", "1700000000"),
        ("webhook-signature", "v1,abc"),
    ]
    .into_iter()
    .collect();

    let envelope = WebhookEnvelope::new(headers, r#"{"type":"org.created"}"#);

    assert_eq!(envelope.message_id(), Some("msg_2"));
    assert_eq!(envelope.timestamp(), Some("1700000000"));
    assert_eq!(envelope.signature(), Some("v1,abc"));
    assert_eq!(envelope.body.as_ref(), br#"{"type":"org.created"}"#);
}

#[test]
fn test_webhook_error_categories() {
    let replay = WebhookError::from(VerificationError::ReplayRejected {
        timestamp: 1,
        now: 1_000,
        tolerance_seconds: 300,
    });
    assert_eq!(replay.error_category(), ErrorCategory::Security);
    assert_eq!(replay.stage(), PipelineStage::Verification);
    assert!(!replay.is_transient());

    let parse = WebhookError::from(EventParseError::MissingEventType);
    assert_eq!(parse.error_category(), ErrorCategory::Permanent);
    assert_eq!(parse.stage(), PipelineStage::Parsing);

    let dispatch = WebhookError::from(DispatchError::Unavailable {
        message: "bus closed".to_string(),
    });
    assert!(dispatch.is_transient());
    assert_eq!(dispatch.error_category(), ErrorCategory::Transient);
    assert_eq!(dispatch.stage(), PipelineStage::Dispatch);
}
