//! Event parsing and routing.

use super::events::*;
use super::VerifiedPayload;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Maps a payload's `event_type` discriminator onto a typed [`Event`]
///
/// Stateless; the discriminator table is [`EventKind`] itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a verified payload
    ///
    /// Returns `Ok(None)` for discriminators this crate does not model,
    /// including non-string ones.
    pub fn parse(&self, payload: &VerifiedPayload) -> Result<Option<Event>, EventParseError> {
        self.parse_map(payload.as_map())
    }

    /// Parse a decoded JSON value
    ///
    /// Non-object values have no discriminator and fail with
    /// [`EventParseError::MissingEventType`].
    pub fn parse_value(&self, value: &Value) -> Result<Option<Event>, EventParseError> {
        match value.as_object() {
            Some(map) => self.parse_map(map),
            None => Err(EventParseError::MissingEventType),
        }
    }

    fn parse_map(
        &self,
        payload: &serde_json::Map<String, Value>,
    ) -> Result<Option<Event>, EventParseError> {
        let event_type = match payload.get("event_type") {
            None | Some(Value::Null) => return Err(EventParseError::MissingEventType),
            Some(Value::String(event_type)) => event_type.as_str(),
            Some(other) => {
                debug!(event_type = %other, "Unsupported non-string event type");
                return Ok(None);
            }
        };

        let Ok(kind) = event_type.parse::<EventKind>() else {
            debug!(event_type = %event_type, "Unsupported event type");
            return Ok(None);
        };

        construct(kind, payload)
            .map(Some)
            .map_err(|e| EventParseError::MalformedPayload {
                event_type: kind.as_str().to_string(),
                message: e.to_string(),
            })
    }

    /// Check whether a discriminator maps to a typed event
    pub fn is_supported(&self, event_type: &str) -> bool {
        event_type.parse::<EventKind>().is_ok()
    }

    /// All supported discriminators
    pub fn supported_event_types(&self) -> Vec<&'static str> {
        EventKind::ALL.iter().map(EventKind::as_str).collect()
    }
}

fn construct(
    kind: EventKind,
    payload: &serde_json::Map<String, Value>,
) -> Result<Event, serde_json::Error> {
    let event = match kind {
        EventKind::OrgCreated => Event::OrgCreated(fields(payload)?),
        EventKind::OrgUpdated => Event::OrgUpdated(fields(payload)?),
        EventKind::OrgDeleted => Event::OrgDeleted(fields(payload)?),
        EventKind::UserAddedToOrg => Event::UserAddedToOrg(fields(payload)?),
        EventKind::UserCreated => Event::UserCreated(fields(payload)?),
        EventKind::UserDeleted => Event::UserDeleted(fields(payload)?),
        EventKind::UserDisabled => Event::UserDisabled(fields(payload)?),
        EventKind::UserEnabled => Event::UserEnabled(fields(payload)?),
        EventKind::UserLocked => Event::UserLocked(fields(payload)?),
        EventKind::UserRemovedFromOrg => Event::UserRemovedFromOrg(fields(payload)?),
        EventKind::UserUpdated => Event::UserUpdated(fields(payload)?),
        EventKind::UserRoleChangedWithinOrg => Event::UserRoleChangedWithinOrg(fields(payload)?),
    };
    Ok(event)
}

fn fields<T: DeserializeOwned>(
    payload: &serde_json::Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(payload.clone()))
}

/// Errors raised when a payload cannot become a typed event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventParseError {
    #[error("Webhook payload must contain an \"event_type\" field")]
    MissingEventType,

    #[error("Malformed '{event_type}' payload: {message}")]
    MalformedPayload { event_type: String, message: String },
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
