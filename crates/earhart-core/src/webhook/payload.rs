//! Decoded webhook body.

use super::VerificationError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// JSON object body of a delivery that passed verification
///
/// Only [`super::SignatureVerifier`] creates these, except when the policy
/// explicitly disables verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedPayload {
    fields: Map<String, Value>,
}

impl VerifiedPayload {
    /// Decode a body that has already been authenticated
    pub(crate) fn decode(body: &[u8]) -> Result<Self, VerificationError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| VerificationError::InvalidBody {
                message: e.to_string(),
            })?;

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(VerificationError::InvalidBody {
                message: format!("expected a JSON object, got {}", json_type_name(&other)),
            }),
        }
    }

    /// Decode a body without authentication
    ///
    /// Reserved for pipelines whose policy turns verification off.
    pub(crate) fn decode_unverified(body: &[u8]) -> Result<Self, VerificationError> {
        Self::decode(body)
    }

    /// Value of the `event_type` discriminator
    ///
    /// Non-string discriminators are rendered as JSON text; `null` counts as
    /// absent.
    pub fn event_type(&self) -> Option<Cow<'_, str>> {
        match self.fields.get("event_type")? {
            Value::Null => None,
            Value::String(event_type) => Some(Cow::Borrowed(event_type.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
