//! Generation client: one call, end to end.
//!
//! ## Flow
//! 1. Resolve {provider, model} for the call site
//! 2. Assemble the prompt
//! 3. Fetch the cached adapter for the pair, building it on first use
//! 4. Call the adapter under the retry policy
//! 5. Record exactly one usage record, then return
//!
//! A failed call (including one whose retries ran out) records nothing.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use cadence_core::usage::check_ceremony_name;
use cadence_core::{
    AssemblyError, CallSite, CeremonyConfig, ConfigError, ConfigStore, GenerationRequest,
    ModelResolver, ModelSelection, PromptAssembler, Resolution, TokenUsage, UsageRecord,
};

use crate::cache::AdapterCache;
use crate::config::{RetryPolicy, RuntimeConfig};
use crate::ledger::{LedgerError, UsageLedger};
use crate::providers::{
    AdapterSource, CredentialCheck, ErrorKind, LlmProvider, ProviderError, ProviderFactory,
};
use crate::retry::{with_retry, RetryFailure};
use crate::session::{SessionUsage, UsageSummary};

/// A provider error enriched with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub error: ProviderError,
    pub selection: ModelSelection,
    pub site: CallSite,
    /// Attempts made; zero when no call was started
    pub attempts: u32,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ModelSelection { provider, model } = &self.selection;
        match &self.error {
            // The credential message is shown as-is
            ProviderError::Auth { message } => f.write_str(message),
            ProviderError::RateLimited { .. } => write!(
                f,
                "{} is rate limiting model '{}' at {} (gave up after {} attempt(s)). \
                 Wait and try again, or switch this stage to another provider in the ceremony configuration.",
                provider, model, self.site, self.attempts
            ),
            error if self.attempts > 1 => write!(
                f,
                "{}/{} failed at {} after {} attempts: {}",
                provider, model, self.site, self.attempts, error
            ),
            error => write!(f, "{}/{} failed at {}: {}", provider, model, self.site, error),
        }
    }
}

impl std::error::Error for ProviderFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors from the generation client.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderFailure),

    #[error("Prompt assembly failed at {site}: {source}")]
    Assembly {
        site: CallSite,
        #[source]
        source: AssemblyError,
    },

    #[error("Usage could not be recorded: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GenerationError {
    /// Provider error kind, when the failure came from a backend.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GenerationError::Provider(failure) => Some(failure.error.kind()),
            _ => None,
        }
    }

    /// Short tag for reports and logs.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            GenerationError::Provider(failure) => failure.error.kind().as_str(),
            GenerationError::Assembly { .. } => "assembly",
            GenerationError::Ledger(_) => "ledger",
            GenerationError::Config(_) => "config",
        }
    }
}

/// What a call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    Text(String),
    /// Parsed and schema-checked
    Structured(JsonValue),
}

impl GenerationOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            GenerationOutput::Text(text) => Some(text),
            GenerationOutput::Structured(_) => None,
        }
    }

    pub fn into_structured(self) -> Option<JsonValue> {
        match self {
            GenerationOutput::Structured(value) => Some(value),
            GenerationOutput::Text(_) => None,
        }
    }
}

/// A successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub output: GenerationOutput,
    pub usage: TokenUsage,
    /// The configured pair the call was routed to
    pub selection: ModelSelection,
    /// Model id as reported by the backend
    pub backend_model: String,
    pub attempts: u32,
}

/// One credential ping made by [`GenerationClient::preflight`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightCheck {
    /// First call site that resolves to this pair
    pub site: CallSite,
    pub selection: ModelSelection,
    pub credential: CredentialCheck,
}

/// Outcome of eager credential validation for a ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub ceremony: String,
    pub checks: Vec<PreflightCheck>,
}

impl PreflightReport {
    pub fn all_valid(&self) -> bool {
        self.checks.iter().all(|c| c.credential.valid)
    }
}

/// Builder for [`GenerationClient`].
pub struct GenerationClientBuilder {
    ledger: UsageLedger,
    config: Option<CeremonyConfig>,
    store: Option<ConfigStore>,
    adapters: Option<Arc<dyn AdapterSource>>,
    retry: RetryPolicy,
    assembler: PromptAssembler,
    cache_capacity: u64,
}

impl GenerationClientBuilder {
    /// Use a fixed configuration snapshot.
    pub fn config(mut self, config: CeremonyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a store; [`GenerationClient::reload_config`]
    /// re-reads it.
    pub fn config_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Where adapters come from. Defaults to [`ProviderFactory`] over the
    /// process environment.
    pub fn adapters(mut self, adapters: Arc<dyn AdapterSource>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<GenerationClient, ConfigError> {
        let config = match (self.config, &self.store) {
            (Some(config), _) => config,
            (None, Some(store)) => store.load()?,
            (None, None) => CeremonyConfig::default(),
        };

        Ok(GenerationClient {
            store: self.store,
            config: RwLock::new(Arc::new(config)),
            adapters: self
                .adapters
                .unwrap_or_else(|| Arc::new(ProviderFactory::default())),
            cache: AdapterCache::new(self.cache_capacity),
            assembler: self.assembler,
            ledger: self.ledger,
            session: SessionUsage::new(),
            retry: self.retry,
        })
    }
}

/// Runs generation calls for ceremonies.
///
/// Holds a configuration snapshot, replaced only by
/// [`reload_config`](Self::reload_config) or [`update_config`](Self::update_config).
pub struct GenerationClient {
    store: Option<ConfigStore>,
    config: RwLock<Arc<CeremonyConfig>>,
    adapters: Arc<dyn AdapterSource>,
    cache: AdapterCache,
    assembler: PromptAssembler,
    ledger: UsageLedger,
    session: SessionUsage,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn builder(ledger: UsageLedger) -> GenerationClientBuilder {
        GenerationClientBuilder {
            ledger,
            config: None,
            store: None,
            adapters: None,
            retry: RetryPolicy::default(),
            assembler: PromptAssembler::new(),
            cache_capacity: 64,
        }
    }

    /// Client wired from runtime configuration with the production factory.
    pub fn from_runtime_config(runtime: &RuntimeConfig) -> Result<Self, ConfigError> {
        Self::builder(UsageLedger::new(&runtime.ledger_path))
            .config_store(ConfigStore::new(&runtime.config_path))
            .retry(runtime.retry.clone())
            .build()
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<CeremonyConfig> {
        Arc::clone(&self.config.read())
    }

    /// Re-read the configuration store. Without a store this is a no-op.
    pub fn reload_config(&self) -> Result<(), ConfigError> {
        if let Some(store) = &self.store {
            let fresh = store.load()?;
            *self.config.write() = Arc::new(fresh);
            tracing::debug!(path = %store.path().display(), "Ceremony config reloaded");
        }
        Ok(())
    }

    /// Edit the persisted configuration and swap in the result.
    pub fn update_config<F>(&self, edit: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut CeremonyConfig),
    {
        let updated = match &self.store {
            Some(store) => store.update(edit)?,
            None => {
                let mut config = (*self.config()).clone();
                edit(&mut config);
                config.validate()?;
                config
            }
        };
        *self.config.write() = Arc::new(updated);
        Ok(())
    }

    pub fn resolve(&self, site: &CallSite) -> Resolution {
        ModelResolver::new(&self.config()).resolve(site)
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn session_usage(&self) -> UsageSummary {
        self.session.snapshot()
    }

    /// Run one call. Structured output is requested when the request carries
    /// an output schema.
    pub async fn generate(
        &self,
        site: &CallSite,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        // A call whose usage cannot be recorded is never made
        check_ceremony_name(&site.ceremony).map_err(LedgerError::from)?;

        let selection = self.resolve(site).selection;
        let prompt = self
            .assembler
            .assemble(request)
            .map_err(|source| GenerationError::Assembly {
                site: site.clone(),
                source,
            })?;

        let adapter = self
            .cache
            .get_or_build(self.adapters.as_ref(), selection.provider, &selection.model)
            .await
            .map_err(|error| failure(site, &selection, error, 0))?;

        let outcome = match &request.output_schema {
            Some(schema) => {
                with_retry(&self.retry, |_| {
                    let (adapter, prompt) = (&adapter, &prompt);
                    async move {
                        adapter
                            .generate_structured(&prompt.text, schema, prompt.max_tokens(), prompt.system.as_deref())
                            .await
                            .map(|c| (GenerationOutput::Structured(c.value), c.usage, c.model))
                    }
                })
                .await
            }
            None => {
                with_retry(&self.retry, |_| {
                    let (adapter, prompt) = (&adapter, &prompt);
                    async move {
                        adapter
                            .generate(&prompt.text, prompt.max_tokens(), prompt.system.as_deref())
                            .await
                            .map(|c| (GenerationOutput::Text(c.text), c.usage, c.model))
                    }
                })
                .await
            }
        };

        let ((output, usage, backend_model), attempts) = outcome.map_err(
            |RetryFailure { error, attempts }| failure(site, &selection, error, attempts),
        )?;

        self.ledger
            .record_async(UsageRecord::new(site.ceremony.as_str(), usage, Utc::now()))
            .await?;
        self.session.record(selection.provider, &selection.model, usage);

        tracing::debug!(
            site = %site,
            provider = %selection.provider,
            model = %selection.model,
            attempts,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Generation succeeded"
        );

        Ok(GenerationResult {
            output,
            usage,
            selection,
            backend_model,
            attempts,
        })
    }

    /// Run one call that must return JSON satisfying `schema`.
    pub async fn generate_structured(
        &self,
        site: &CallSite,
        request: GenerationRequest,
        schema: JsonValue,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(site, &request.structured(schema)).await
    }

    /// Check credentials for every pair a ceremony can resolve to.
    ///
    /// A missing credential fails before any ping is sent. Each distinct
    /// pair then gets one real ping call; rejected keys are reported in the
    /// result rather than as an error. Pings are not recorded as usage.
    pub async fn preflight(&self, ceremony: &str) -> Result<PreflightReport, GenerationError> {
        let selections = ModelResolver::new(&self.config()).ceremony_selections(ceremony);

        for (site, selection) in &selections {
            self.adapters
                .check_credential(selection.provider)
                .map_err(|error| failure(site, selection, error, 0))?;
        }

        let mut checks = Vec::with_capacity(selections.len());
        for (site, selection) in selections {
            let adapter: Arc<dyn LlmProvider> = self
                .cache
                .get_or_build(self.adapters.as_ref(), selection.provider, &selection.model)
                .await
                .map_err(|error| failure(&site, &selection, error, 0))?;

            let credential = adapter.validate_credential().await;
            if let Some(error) = &credential.error {
                tracing::warn!(
                    ceremony,
                    provider = %selection.provider,
                    model = %selection.model,
                    error = %error,
                    "Credential check failed"
                );
            }
            checks.push(PreflightCheck {
                site,
                selection,
                credential,
            });
        }

        tracing::info!(ceremony, pairs = checks.len(), "Preflight complete");
        Ok(PreflightReport {
            ceremony: ceremony.to_string(),
            checks,
        })
    }
}

fn failure(site: &CallSite, selection: &ModelSelection, error: ProviderError, attempts: u32) -> GenerationError {
    GenerationError::Provider(ProviderFailure {
        error,
        selection: selection.clone(),
        site: site.clone(),
        attempts,
    })
}
