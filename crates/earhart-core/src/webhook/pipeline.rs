//! Webhook pipeline orchestration.
//!
//! Runs Verify → Parse → Enrich → Dispatch → Invalidate for each delivery.
//! Verification, parsing and dispatch are fatal; enrichment and invalidation
//! failures become warnings on the result.

use super::cache::CacheStore;
use super::dispatch::{EventBus, EventDispatcher, EventNotification};
use super::enricher::{Enrichment, EventEnricher};
use super::entities::{OrgFetcher, UserFetcher};
use super::events::Event;
use super::invalidator::CacheInvalidator;
use super::parser::EventParser;
use super::payload::VerifiedPayload;
use super::policy::{PolicyError, WebhookPolicy};
use super::result::ProcessingResult;
use super::signature::{SignatureVerifier, VerificationError};
use super::WebhookEnvelope;
use crate::CorrelationId;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Processes webhook deliveries according to a [`WebhookPolicy`]
///
/// Holds no per-delivery state and can be shared across tasks behind an
/// `Arc`.
pub struct WebhookPipeline {
    policy: Arc<WebhookPolicy>,
    verifier: Option<SignatureVerifier>,
    parser: EventParser,
    users: Option<Arc<dyn UserFetcher>>,
    orgs: Option<Arc<dyn OrgFetcher>>,
    dispatcher: Arc<dyn EventDispatcher>,
    invalidator: Option<CacheInvalidator>,
}

impl WebhookPipeline {
    pub fn builder(policy: WebhookPolicy) -> WebhookPipelineBuilder {
        WebhookPipelineBuilder::new(policy)
    }

    pub fn policy(&self) -> &WebhookPolicy {
        &self.policy
    }

    pub fn parser(&self) -> &EventParser {
        &self.parser
    }

    /// Process one delivery
    ///
    /// Never fails; inspect the returned result.
    #[instrument(
        skip(self, envelope),
        fields(delivery_id = %envelope.message_id().unwrap_or("-"), body_len = envelope.body.len())
    )]
    pub async fn process(&self, envelope: WebhookEnvelope) -> ProcessingResult {
        let correlation_id = CorrelationId::new();
        let result = ProcessingResult::start(
            envelope.message_id().map(str::to_string),
            correlation_id,
            envelope.received_at,
        );

        let payload = match self.verify(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Webhook rejected");
                return result.fail(&e.into());
            }
        };

        self.run(payload, result).await
    }

    /// Process deliveries one after another, one result each, in order
    pub async fn handle_batch(&self, envelopes: Vec<WebhookEnvelope>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            results.push(self.process(envelope).await);
        }
        results
    }

    fn verify(&self, envelope: &WebhookEnvelope) -> Result<VerifiedPayload, VerificationError> {
        let Some(verifier) = &self.verifier else {
            return VerifiedPayload::decode_unverified(&envelope.body);
        };

        let payload = verifier.verify(&envelope.body, &envelope.headers)?;

        // Present once verify succeeded
        let timestamp = envelope.timestamp().unwrap_or_default();
        verifier.check_timestamp(
            timestamp,
            envelope.received_at.unix_seconds(),
            self.policy.timestamp_tolerance_seconds(),
        )?;

        Ok(payload)
    }

    async fn run(&self, payload: VerifiedPayload, mut result: ProcessingResult) -> ProcessingResult {
        if let Some(event_type) = payload.event_type() {
            result.set_event_type(event_type);
        }

        let event = match self.parser.parse(&payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                info!(
                    event_type = %result.event_type().unwrap_or("-"),
                    "Unsupported event type, skipping"
                );
                return result.unsupported();
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse webhook payload");
                return result.fail(&e.into());
            }
        };
        result.set_event(event.clone());

        let enrichment = self.enrich(&event, &mut result).await;

        let notification = EventNotification {
            event,
            enrichment,
            delivery_id: result.delivery_id().map(str::to_string),
            correlation_id: result.correlation_id().clone(),
            received_at: result.received_at(),
        };

        if let Err(e) = self.dispatcher.dispatch(&notification).await {
            error!(error = %e, event_type = %notification.event.event_type(), "Dispatch failed");
            return result.fail(&e.into());
        }
        result.mark_dispatched();

        self.invalidate(&notification.event, &mut result).await;

        info!(
            event_type = %notification.event.event_type(),
            enriched = result.enriched(),
            cache_invalidated = result.cache_invalidated(),
            warnings = result.warnings().len(),
            "Webhook processed"
        );
        result.succeed()
    }

    async fn enrich(&self, event: &Event, result: &mut ProcessingResult) -> Enrichment {
        let (Some(users), Some(orgs)) = (&self.users, &self.orgs) else {
            return Enrichment::default();
        };

        // Memoization is scoped to this run
        let mut enricher = EventEnricher::new(Arc::clone(users), Arc::clone(orgs));
        match enricher.enrich(event).await {
            Ok(enrichment) => {
                result.mark_enriched();
                enrichment
            }
            Err(e) => {
                warn!(error = %e, "Enrichment failed, dispatching without snapshots");
                result.add_warning(format!("Enrichment failed: {}", e));
                Enrichment::default()
            }
        }
    }

    async fn invalidate(&self, event: &Event, result: &mut ProcessingResult) {
        let Some(invalidator) = &self.invalidator else {
            return;
        };

        match invalidator.handle(event).await {
            Ok(keys) => {
                debug!(keys = ?keys, "Cache invalidated");
                result.mark_cache_invalidated();
            }
            Err(e) => {
                warn!(error = %e, "Cache invalidation failed");
                result.add_warning(format!("Cache invalidation failed: {}", e));
            }
        }
    }
}

impl std::fmt::Debug for WebhookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookPipeline")
            .field("policy", &self.policy)
            .field("verifies", &self.verifier.is_some())
            .field("enriches", &self.users.is_some())
            .field("invalidates", &self.invalidator.is_some())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`WebhookPipeline`] from a policy and its collaborators
pub struct WebhookPipelineBuilder {
    policy: WebhookPolicy,
    users: Option<Arc<dyn UserFetcher>>,
    orgs: Option<Arc<dyn OrgFetcher>>,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl WebhookPipelineBuilder {
    pub fn new(policy: WebhookPolicy) -> Self {
        Self {
            policy,
            users: None,
            orgs: None,
            dispatcher: None,
            cache: None,
        }
    }

    pub fn user_fetcher(mut self, users: Arc<dyn UserFetcher>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn org_fetcher(mut self, orgs: Arc<dyn OrgFetcher>) -> Self {
        self.orgs = Some(orgs);
        self
    }

    /// Observer notification; defaults to an [`EventBus`] with no listeners
    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the policy and assemble the pipeline
    ///
    /// # Errors
    ///
    /// Fails when verification is on without a usable secret, or when an
    /// enabled stage lacks its collaborator.
    pub fn build(self) -> Result<WebhookPipeline, PolicyError> {
        self.policy.validate()?;

        let verifier = if self.policy.verify_signatures() {
            let secret = self
                .policy
                .signing_secret()
                .ok_or(PolicyError::MissingSigningSecret)?;
            let verifier = SignatureVerifier::new(secret.clone())?;
            debug!(secret = %verifier.masked_secret(), "Signature verification enabled");
            Some(verifier)
        } else {
            warn!("Webhook signature verification is DISABLED; deliveries are not authenticated");
            None
        };

        let (users, orgs) = if self.policy.enrich_events() {
            let users = self.users.ok_or_else(|| missing("user fetcher"))?;
            let orgs = self.orgs.ok_or_else(|| missing("organisation fetcher"))?;
            (Some(users), Some(orgs))
        } else {
            (None, None)
        };

        let policy = Arc::new(self.policy);

        let invalidator = if policy.invalidate_cache() {
            let cache = self.cache.ok_or_else(|| missing("cache store"))?;
            Some(CacheInvalidator::new(cache, Arc::clone(&policy)))
        } else {
            None
        };

        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(EventBus::new()));

        Ok(WebhookPipeline {
            policy,
            verifier,
            parser: EventParser::new(),
            users,
            orgs,
            dispatcher,
            invalidator,
        })
    }
}

fn missing(component: &str) -> PolicyError {
    PolicyError::MissingComponent {
        component: component.to_string(),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
