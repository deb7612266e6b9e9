//! Webhook signature verification.
//!
//! Deliveries are signed with HMAC-SHA256 over `"{id}.{timestamp}.{body}"`
//! and carry one or more `v1,<base64>` signatures. Verification uses
//! constant-time comparison and rejects timestamps outside the configured
//! tolerance window.

use super::{VerifiedPayload, WebhookHeaders};
use crate::ErrorCategory;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type HmacSha256 = Hmac<Sha256>;

/// Header names carrying the delivery identifier, in lookup order
pub const MESSAGE_ID_HEADERS: [&str; 2] = ["svix-id", "webhook-id"];

/// Header names carrying the signing timestamp, in lookup order
pub const TIMESTAMP_HEADERS: [&str; 2] = ["svix-timestamp", "webhook-timestamp"];

/// Header names carrying the signature list, in lookup order
pub const SIGNATURE_HEADERS: [&str; 2] = ["svix-signature", "webhook-signature"];

const SIGNATURE_VERSION: &str = "v1";
const SECRET_PREFIX: &str = "whsec_";
const MASK_VISIBLE_CHARS: usize = 8;

// ============================================================================
// Signing Secret
// ============================================================================

/// Shared signing secret
///
/// Zeroed on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret value
    ///
    /// Avoid logging or persisting the returned string.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// True for an empty or whitespace-only secret
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Masked form for diagnostics
    ///
    /// Shows the first eight characters followed by one `*` per remaining
    /// character. Secrets of eight characters or fewer are fully masked.
    pub fn masked(&self) -> String {
        let total = self.0.chars().count();
        if total <= MASK_VISIBLE_CHARS {
            return "*".repeat(total);
        }

        let visible: String = self.0.chars().take(MASK_VISIBLE_CHARS).collect();
        format!("{}{}", visible, "*".repeat(total - MASK_VISIBLE_CHARS))
    }

    /// Decode the HMAC key material
    ///
    /// `whsec_`-prefixed secrets carry base64 key bytes; anything else is
    /// used as raw bytes.
    fn key_bytes(&self) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        if self.is_blank() {
            return Err(SecretError::Empty);
        }

        match self.0.strip_prefix(SECRET_PREFIX) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Zeroizing::new)
                .map_err(|e| SecretError::InvalidEncoding {
                    message: e.to_string(),
                }),
            None => Ok(Zeroizing::new(self.0.as_bytes().to_vec())),
        }
    }
}

impl From<String> for SigningSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SigningSecret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

// Security: Don't expose secrets in debug output
impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<REDACTED>)")
    }
}

/// Errors raised while preparing a signing secret
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("Webhook signing secret is empty")]
    Empty,

    #[error("Webhook signing secret is not valid base64: {message}")]
    InvalidEncoding { message: String },

    #[error("Webhook signing secret cannot be used as an HMAC key")]
    UnusableKey,
}

// ============================================================================
// Verifier
// ============================================================================

/// Verifies delivery authenticity and freshness
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SigningSecret,
    mac: HmacSha256,
}

impl SignatureVerifier {
    /// Create a verifier for the given secret
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Empty`] for a blank secret and
    /// [`SecretError::InvalidEncoding`] when a `whsec_` secret does not
    /// decode.
    pub fn new(secret: impl Into<SigningSecret>) -> Result<Self, SecretError> {
        let secret = secret.into();
        let key = secret.key_bytes()?;
        let mac = <HmacSha256 as Mac>::new_from_slice(&key).map_err(|_| SecretError::UnusableKey)?;
        Ok(Self { secret, mac })
    }

    /// Masked secret suitable for logs and status output
    pub fn masked_secret(&self) -> String {
        self.secret.masked()
    }

    /// Verify a delivery and decode its body
    ///
    /// Checks that the id, timestamp and signature headers are present, that
    /// one of the `v1` signatures matches, and that the body is a JSON object.
    /// Freshness is checked separately by [`SignatureVerifier::check_timestamp`].
    #[instrument(skip(self, body, headers), fields(body_len = body.len()))]
    pub fn verify(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<VerifiedPayload, VerificationError> {
        let message_id = headers.get_any(&MESSAGE_ID_HEADERS);
        let timestamp = headers.get_any(&TIMESTAMP_HEADERS);
        let signature = headers.get_any(&SIGNATURE_HEADERS);

        let (message_id, timestamp, signature) = match (message_id, timestamp, signature) {
            (Some(id), Some(ts), Some(sig)) => (id, ts, sig),
            _ => {
                let missing = [
                    (message_id, MESSAGE_ID_HEADERS[0]),
                    (timestamp, TIMESTAMP_HEADERS[0]),
                    (signature, SIGNATURE_HEADERS[0]),
                ]
                .into_iter()
                .filter(|(value, _)| value.is_none())
                .map(|(_, name)| name.to_string())
                .collect();
                return Err(VerificationError::MissingHeaders { headers: missing });
            }
        };

        self.verify_signature(message_id, timestamp, body, signature)?;
        debug!(message_id = %message_id, "Webhook signature verified");

        VerifiedPayload::decode(body)
    }

    /// Check a signature list against the expected HMAC
    ///
    /// Entries are space separated; entries with another version tag or
    /// undecodable base64 are skipped.
    pub fn verify_signature(
        &self,
        message_id: &str,
        timestamp: &str,
        body: &[u8],
        signatures: &str,
    ) -> Result<(), VerificationError> {
        let expected = self.compute(message_id, timestamp, body);

        let mut candidates = 0usize;
        let mut matched = false;
        for entry in signatures.split_whitespace() {
            let Some((version, encoded)) = entry.split_once(',') else {
                continue;
            };
            if version != SIGNATURE_VERSION {
                continue;
            }
            let Ok(decoded) = STANDARD.decode(encoded) else {
                continue;
            };

            candidates += 1;
            if constant_time_compare(&decoded, &expected) {
                matched = true;
            }
        }

        if matched {
            return Ok(());
        }

        warn!(candidates, "Webhook signature did not match");
        Err(VerificationError::AuthenticationFailure {
            message: if candidates == 0 {
                "no usable v1 signature supplied".to_string()
            } else {
                "no supplied signature matches".to_string()
            },
        })
    }

    /// Check that a timestamp header lies within the tolerance window
    ///
    /// Returns the parsed timestamp on success.
    pub fn check_timestamp(
        &self,
        timestamp_header: &str,
        now: i64,
        tolerance_seconds: u64,
    ) -> Result<i64, VerificationError> {
        let timestamp = timestamp_header.trim().parse::<i64>().map_err(|_| {
            VerificationError::InvalidTimestamp {
                value: timestamp_header.to_string(),
            }
        })?;

        if !is_timestamp_fresh(timestamp, now, tolerance_seconds) {
            warn!(timestamp, now, tolerance_seconds, "Webhook timestamp outside tolerance");
            return Err(VerificationError::ReplayRejected {
                timestamp,
                now,
                tolerance_seconds,
            });
        }

        Ok(timestamp)
    }

    /// Produce a `v1,<base64>` signature for the given delivery
    pub fn sign(&self, message_id: &str, timestamp: i64, body: &[u8]) -> String {
        let mac = self.compute(message_id, &timestamp.to_string(), body);
        format!("{},{}", SIGNATURE_VERSION, STANDARD.encode(mac))
    }

    fn compute(&self, message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

// Security: Don't expose secrets in debug output
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

/// True when `timestamp` is within `tolerance_seconds` of `now`, inclusive
pub fn is_timestamp_fresh(timestamp: i64, now: i64, tolerance_seconds: u64) -> bool {
    let drift = (i128::from(now) - i128::from(timestamp)).unsigned_abs();
    drift <= u128::from(tolerance_seconds)
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    // Length is not secret
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ============================================================================
// Errors
// ============================================================================

/// Coarse verification outcome used for acknowledgement decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailure {
    /// Request is structurally unusable (missing headers, bad body)
    MalformedRequest,
    /// Signature did not match
    AuthenticationFailure,
    /// Timestamp outside the tolerance window
    ReplayRejected,
}

/// Errors returned by [`SignatureVerifier`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required webhook headers: {}", .headers.join(", "))]
    MissingHeaders { headers: Vec<String> },

    #[error("Invalid webhook timestamp: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("Invalid webhook signature: {message}")]
    AuthenticationFailure { message: String },

    #[error("Webhook timestamp {timestamp} is outside the {tolerance_seconds}s tolerance window (now {now})")]
    ReplayRejected {
        timestamp: i64,
        now: i64,
        tolerance_seconds: u64,
    },

    #[error("Invalid webhook body: {message}")]
    InvalidBody { message: String },
}

impl VerificationError {
    pub fn failure(&self) -> VerificationFailure {
        match self {
            Self::MissingHeaders { .. } | Self::InvalidTimestamp { .. } | Self::InvalidBody { .. } => {
                VerificationFailure::MalformedRequest
            }
            Self::AuthenticationFailure { .. } => VerificationFailure::AuthenticationFailure,
            Self::ReplayRejected { .. } => VerificationFailure::ReplayRejected,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self.failure() {
            VerificationFailure::MalformedRequest => ErrorCategory::Permanent,
            VerificationFailure::AuthenticationFailure | VerificationFailure::ReplayRejected => {
                ErrorCategory::Security
            }
        }
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
