//! # cadence-runtime
//!
//! Async execution for cadence ceremonies.
//!
//! This crate owns everything that touches the network or the disk:
//! - Provider adapters for Claude, OpenAI and Gemini behind one trait
//! - The generation client (resolve, assemble, call, retry, record usage)
//! - The persisted usage ledger
//! - The validation orchestrator (concurrent fan-out, partial failure)
//!
//! The pure pieces (configuration, resolution, prompt assembly, usage
//! arithmetic, aggregation) live in `cadence-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadence_core::{CallSite, GenerationRequest, WorkItem};
//! use cadence_runtime::{GenerationClient, RuntimeConfig, ValidationOrchestrator};
//!
//! let runtime = RuntimeConfig::load(".cadence/runtime.yaml")?;
//! let client = Arc::new(GenerationClient::from_runtime_config(&runtime)?);
//!
//! client.preflight("sprint-planning").await?;
//!
//! let result = client
//!     .generate(
//!         &CallSite::new("sprint-planning", "decomposition"),
//!         &GenerationRequest::new("Split {{EPIC}} into stories").value("EPIC", "checkout"),
//!     )
//!     .await?;
//!
//! let orchestrator = ValidationOrchestrator::builder()
//!     .client(client)
//!     .ceremony("sprint-planning")
//!     .runtime_config(&runtime)
//!     .build()?;
//! let report = orchestrator.run(&WorkItem::new("epic-1", "Checkout")).await?;
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod session;
pub mod templates;

#[cfg(test)]
mod testing;

pub use cache::AdapterCache;
pub use client::{
    GenerationClient, GenerationClientBuilder, GenerationError, GenerationOutput, GenerationResult,
    PreflightCheck, PreflightReport, ProviderFailure,
};
pub use config::{RetryPolicy, RuntimeConfig, RuntimeConfigError};
pub use ledger::{LedgerError, UsageLedger};
pub use orchestrator::{OrchestratorError, ValidationOrchestrator, ValidationOrchestratorBuilder};
pub use providers::{
    AdapterSource, ApiCredential, Completion, CredentialCheck, CredentialLookup, ErrorKind,
    LlmProvider, ProviderError, ProviderFactory, StructuredCompletion,
};
pub use retry::{with_retry, RetryFailure};
pub use session::{SessionUsage, UsageSummary};
pub use templates::{DirectoryTemplates, InMemoryTemplates, TemplateStore};
