//! Outcome of processing one delivery.

use super::events::Event;
use super::signature::VerificationFailure;
use super::WebhookError;
use crate::{CorrelationId, RunId, Timestamp};
use serde::Serialize;

/// Pipeline stage names used for failure attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Configuration,
    Verification,
    Parsing,
    Enrichment,
    Dispatch,
    Invalidation,
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Verified, parsed and dispatched
    Succeeded,
    /// A fatal stage failed
    Failed,
    /// Verified but the event type is not modelled
    Unsupported,
}

/// Result of one pipeline run
///
/// Built up by the pipeline and handed back once the run ends. Only the
/// pipeline changes it.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    status: ProcessingStatus,
    event_type: Option<String>,
    event: Option<Event>,
    enriched: bool,
    dispatched: bool,
    cache_invalidated: bool,
    warnings: Vec<String>,
    error: Option<String>,
    failed_stage: Option<PipelineStage>,
    verification_failure: Option<VerificationFailure>,
    delivery_id: Option<String>,
    correlation_id: CorrelationId,
    run_id: RunId,
    received_at: Timestamp,
}

impl ProcessingResult {
    pub(crate) fn start(
        delivery_id: Option<String>,
        correlation_id: CorrelationId,
        received_at: Timestamp,
    ) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            event_type: None,
            event: None,
            enriched: false,
            dispatched: false,
            cache_invalidated: false,
            warnings: Vec::new(),
            error: None,
            failed_stage: None,
            verification_failure: None,
            delivery_id,
            correlation_id,
            run_id: RunId::new(),
            received_at,
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub(crate) fn set_event_type(&mut self, event_type: impl Into<String>) {
        self.event_type = Some(event_type.into());
    }

    pub(crate) fn set_event(&mut self, event: Event) {
        self.event_type = Some(event.event_type().to_string());
        self.event = Some(event);
    }

    pub(crate) fn mark_enriched(&mut self) {
        self.enriched = true;
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    pub(crate) fn mark_cache_invalidated(&mut self) {
        self.cache_invalidated = true;
    }

    pub(crate) fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn succeed(mut self) -> Self {
        self.status = ProcessingStatus::Succeeded;
        self
    }

    pub(crate) fn unsupported(mut self) -> Self {
        self.status = ProcessingStatus::Unsupported;
        self
    }

    pub(crate) fn fail(mut self, error: &WebhookError) -> Self {
        self.status = ProcessingStatus::Failed;
        self.error = Some(error.to_string());
        self.failed_stage = Some(error.stage());
        if let WebhookError::Verification(e) = error {
            self.verification_failure = Some(e.failure());
        }
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// True when verification, parsing and dispatch all completed
    pub fn is_success(&self) -> bool {
        self.status == ProcessingStatus::Succeeded
    }

    /// False only for deliveries whose event type is not modelled
    pub fn is_supported(&self) -> bool {
        self.status != ProcessingStatus::Unsupported
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    pub fn enriched(&self) -> bool {
        self.enriched
    }

    pub fn dispatched(&self) -> bool {
        self.dispatched
    }

    pub fn cache_invalidated(&self) -> bool {
        self.cache_invalidated
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failed_stage(&self) -> Option<PipelineStage> {
        self.failed_stage
    }

    pub fn verification_failure(&self) -> Option<VerificationFailure> {
        self.verification_failure
    }

    pub fn delivery_id(&self) -> Option<&str> {
        self.delivery_id.as_deref()
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// HTTP status a transport should answer the sender with
    ///
    /// Successful and unsupported deliveries are acknowledged with 200.
    /// Malformed requests get 400, authentication and replay failures 401,
    /// and dispatch or configuration failures 500 so the sender retries.
    pub fn acknowledgement_status(&self) -> u16 {
        match self.status {
            ProcessingStatus::Succeeded | ProcessingStatus::Unsupported => 200,
            ProcessingStatus::Failed => match (self.failed_stage, self.verification_failure) {
                (Some(PipelineStage::Verification), Some(VerificationFailure::MalformedRequest)) => {
                    400
                }
                (Some(PipelineStage::Verification), _) => 401,
                (Some(PipelineStage::Parsing), _) => 400,
                _ => 500,
            },
        }
    }

    /// Whether the sender should treat the delivery as handled
    pub fn should_acknowledge(&self) -> bool {
        self.status != ProcessingStatus::Failed
    }

    /// Flat view for logs and transport responses
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            success: self.is_success(),
            supported: self.is_supported(),
            event_type: self.event_type.clone(),
            enriched: self.enriched,
            dispatched: self.dispatched,
            cache_invalidated: self.cache_invalidated,
            error: self.error.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Serializable flat result view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub success: bool,
    pub supported: bool,
    pub event_type: Option<String>,
    pub enriched: bool,
    pub dispatched: bool,
    pub cache_invalidated: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
