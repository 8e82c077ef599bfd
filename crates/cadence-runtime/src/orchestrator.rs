//! Validation orchestrator.
//!
//! Runs one validation pass over a work item:
//! - Selecting: static keyword rules, or an opt-in classification call that
//!   falls back to the static rules on any failure
//! - Dispatching: one isolated structured request per validator, all in flight
//!   at once through the generation client
//! - Collecting: every validator runs to completion; failures are kept, never
//!   short-circuit the run
//! - Aggregating: consensus over the verdicts that came back
//!
//! Only run-level problems (nothing selected, a missing template) fail the
//! run itself.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;

use cadence_core::verdict::verdict_schema;
use cadence_core::{
    select_static, AggregatedReport, Aggregator, AssemblyError, CallSite, GenerationRequest,
    OutputBudget, RunPhase, SelectionBounds, SelectionRecord, ValidationVerdict, ValidatorFailure,
    ValidatorSpec, WorkItem,
};

use crate::client::{GenerationClient, GenerationOutput};
use crate::config::RuntimeConfig;
use crate::prompts::{catalog_listing, classification_schema, CLASSIFICATION_TEMPLATE, VALIDATOR_INSTRUCTIONS};
use crate::templates::{InMemoryTemplates, TemplateStore};

/// Stage name used for validator calls unless configured otherwise.
pub const DEFAULT_VALIDATION_STAGE: &str = "validation";

/// Validation type used to route the classification call.
pub const CLASSIFICATION_VALIDATION_TYPE: &str = "classification";

/// Errors that fail a whole validation run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Orchestrator not configured: {0}")]
    NotConfigured(String),

    #[error("No validators selected for item '{0}'")]
    NoValidators(String),

    #[error("Template for validator '{validator}' is unavailable: {source}")]
    Template {
        validator: String,
        #[source]
        source: AssemblyError,
    },
}

/// Tracks and logs the run's phase sequence.
struct PhaseTracker<'a> {
    item_id: &'a str,
    current: RunPhase,
    visited: Vec<RunPhase>,
}

impl<'a> PhaseTracker<'a> {
    fn start(item_id: &'a str) -> Self {
        tracing::debug!(item = item_id, phase = ?RunPhase::Selecting, "Validation run started");
        Self {
            item_id,
            current: RunPhase::Selecting,
            visited: vec![RunPhase::Selecting],
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.current.next() {
            tracing::debug!(item = self.item_id, from = ?self.current, to = ?next, "Phase transition");
            self.current = next;
            self.visited.push(next);
        }
    }
}

/// Builder for [`ValidationOrchestrator`].
#[derive(Default)]
pub struct ValidationOrchestratorBuilder {
    client: Option<Arc<GenerationClient>>,
    templates: Option<Arc<dyn TemplateStore>>,
    ceremony: Option<String>,
    stage: Option<String>,
    bounds: SelectionBounds,
    classify: bool,
}

impl ValidationOrchestratorBuilder {
    pub fn client(mut self, client: Arc<GenerationClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Validator templates. Defaults to the generic template for every
    /// catalog validator.
    pub fn templates(mut self, templates: Arc<dyn TemplateStore>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Ceremony the validation calls are made (and billed) under.
    pub fn ceremony(mut self, ceremony: impl Into<String>) -> Self {
        self.ceremony = Some(ceremony.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn bounds(mut self, bounds: SelectionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Opt in to model-driven validator selection.
    pub fn classify(mut self, classify: bool) -> Self {
        self.classify = classify;
        self
    }

    /// Selection settings from runtime configuration.
    pub fn runtime_config(self, runtime: &RuntimeConfig) -> Self {
        self.bounds(runtime.selection).classify(runtime.classify_validators)
    }

    pub fn build(self) -> Result<ValidationOrchestrator, OrchestratorError> {
        let client = self
            .client
            .ok_or_else(|| OrchestratorError::NotConfigured("generation client".to_string()))?;
        let ceremony = self
            .ceremony
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OrchestratorError::NotConfigured("ceremony".to_string()))?;

        Ok(ValidationOrchestrator {
            client,
            templates: self
                .templates
                .unwrap_or_else(|| Arc::new(InMemoryTemplates::generic())),
            ceremony,
            stage: self
                .stage
                .unwrap_or_else(|| DEFAULT_VALIDATION_STAGE.to_string()),
            bounds: self.bounds.normalized(),
            classify: self.classify,
        })
    }
}

/// Runs validators over work items and aggregates their verdicts.
pub struct ValidationOrchestrator {
    client: Arc<GenerationClient>,
    templates: Arc<dyn TemplateStore>,
    ceremony: String,
    stage: String,
    bounds: SelectionBounds,
    classify: bool,
}

impl ValidationOrchestrator {
    pub fn builder() -> ValidationOrchestratorBuilder {
        ValidationOrchestratorBuilder::default()
    }

    /// Validate one item.
    pub async fn run(&self, item: &WorkItem) -> Result<AggregatedReport, OrchestratorError> {
        let mut phases = PhaseTracker::start(&item.id);

        let selection = self.select(item).await;
        let specs = selection.specs();
        if specs.is_empty() {
            return Err(OrchestratorError::NoValidators(item.id.clone()));
        }

        let context = item.rendered_context();
        let mut requests = Vec::with_capacity(specs.len());
        for spec in specs {
            let template = self
                .templates
                .template(spec.template)
                .map_err(|source| OrchestratorError::Template {
                    validator: spec.id.to_string(),
                    source,
                })?;
            requests.push((spec, validator_request(spec, template, item, &context)));
        }

        phases.advance();
        let calls: Vec<_> = requests
            .iter()
            .map(|(spec, request)| self.dispatch(spec, request))
            .collect();
        tracing::info!(
            item = %item.id,
            validators = calls.len(),
            method = ?selection.method,
            "Dispatching validators"
        );

        phases.advance();
        let results = join_all(calls).await;

        phases.advance();
        let (verdicts, failures) = Aggregator::partition(results);
        let mut report = Aggregator::new().aggregate(&item.id, verdicts, failures);
        report.selection = Some(selection);

        phases.advance();
        report.phases = phases.visited;

        tracing::info!(
            item = %report.item_id,
            consensus = ?report.consensus_score,
            failed = report.failures.len(),
            ready = report.ready_for_use,
            "Validation run complete"
        );
        Ok(report)
    }

    /// Choose validators for `item`.
    pub async fn select(&self, item: &WorkItem) -> SelectionRecord {
        if !self.classify {
            return select_static(item, self.bounds);
        }

        match self.classify_item(item).await {
            Ok(selection) => selection,
            Err(reason) => {
                tracing::warn!(item = %item.id, reason = %reason, "Classification failed, using static rules");
                select_static(item, self.bounds).into_fallback()
            }
        }
    }

    async fn classify_item(&self, item: &WorkItem) -> Result<SelectionRecord, String> {
        let request = GenerationRequest::new(CLASSIFICATION_TEMPLATE)
            .value("CATALOG", catalog_listing())
            .value("MIN", self.bounds.min.to_string())
            .value("MAX", self.bounds.max.to_string())
            .value("ITEM_ID", item.id.as_str())
            .value("ITEM_TITLE", item.title.as_str())
            .value("ITEM_CONTEXT", item.rendered_context())
            .budget(OutputBudget::Small);
        let site = CallSite::new(self.ceremony.as_str(), self.stage.as_str())
            .with_validation_type(CLASSIFICATION_VALIDATION_TYPE);

        let result = self
            .client
            .generate_structured(&site, request, classification_schema())
            .await
            .map_err(|e| e.to_string())?;

        let value = result
            .output
            .into_structured()
            .ok_or_else(|| "classification returned text".to_string())?;
        let ids: Vec<String> = value
            .get("validators")
            .and_then(|v| v.as_array())
            .map(|ids| ids.iter().filter_map(|id| id.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Ok(SelectionRecord::from_classified(&ids, self.bounds))
    }

    /// Routing key for a validator call: its own id when the stage has an
    /// override for it, otherwise its class.
    fn validation_type(&self, spec: &ValidatorSpec) -> &'static str {
        let config = self.client.config();
        if config.has_validation_override(&self.ceremony, &self.stage, spec.id) {
            spec.id
        } else {
            spec.class()
        }
    }

    async fn dispatch(
        &self,
        spec: &ValidatorSpec,
        request: &GenerationRequest,
    ) -> Result<ValidationVerdict, ValidatorFailure> {
        let site = CallSite::new(self.ceremony.as_str(), self.stage.as_str())
            .with_validation_type(self.validation_type(spec));

        let outcome = match self.client.generate(&site, request).await {
            Ok(result) => match result.output {
                GenerationOutput::Structured(value) => ValidationVerdict::from_payload(spec.id, &value)
                    .map_err(|reason| ("invalid-response", format!("verdict rejected: {}", reason))),
                GenerationOutput::Text(_) => Err(("invalid-response", "expected a JSON verdict".to_string())),
            },
            Err(e) => Err((e.kind_tag(), e.to_string())),
        };

        outcome.map_err(|(kind, message)| {
            tracing::warn!(validator = spec.id, kind, error = %message, "Validator failed");
            ValidatorFailure::new(spec.id, kind, message)
        })
    }
}

/// The isolated request for one validator.
fn validator_request(spec: &ValidatorSpec, template: String, item: &WorkItem, context: &str) -> GenerationRequest {
    GenerationRequest::new(template)
        .value("VALIDATOR_ID", spec.id)
        .value("DOMAIN", spec.domain.as_str())
        .value("ITEM_ID", item.id.as_str())
        .value("ITEM_TITLE", item.title.as_str())
        .value("ITEM_CONTEXT", context)
        .instructions(VALIDATOR_INSTRUCTIONS)
        .budget(OutputBudget::Medium)
        .structured(verdict_schema())
}
