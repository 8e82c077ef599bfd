//! # cadence-core
//!
//! Deterministic building blocks of the cadence ceremony engine.
//!
//! This crate answers, without touching the network:
//! - Which provider and model does this (ceremony, stage, validation type) use?
//! - What exact prompt text goes out, and with which output budget?
//! - Which validators look at a work item?
//! - How do partial validator verdicts combine into one report?
//! - How do token counts roll up into daily/weekly/monthly windows?
//!
//! ## Key Guarantees
//!
//! 1. **Total resolution**: every lookup yields a complete {provider, model} pair
//! 2. **Total assembly**: every placeholder is filled or assembly fails
//! 3. **Additive usage**: window totals equal the sum of recorded executions
//! 4. **Honest consensus**: failed validators are excluded, never scored as zero
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_core::{CallSite, CeremonyConfig, ModelResolver};
//!
//! let config = CeremonyConfig::from_file(".cadence/ceremonies.yaml")?;
//! let resolution = ModelResolver::new(&config)
//!     .resolve(&CallSite::new("sprint-planning", "validation-domain"));
//! println!("{} / {}", resolution.selection.provider, resolution.selection.model);
//! ```

pub mod aggregation;
pub mod config;
pub mod persist;
pub mod prompt;
pub mod resolver;
pub mod types;
pub mod usage;
pub mod validators;
pub mod verdict;

// Re-export main types at crate root
pub use aggregation::{AggregatedReport, Aggregator, FailureStatus, RunPhase, ValidatorFailure};
pub use config::{CeremonyConfig, CeremonyEntry, ConfigError, ConfigStore, ModelOverride, StageEntry};
pub use prompt::{
    AssembledPrompt, AssemblyError, GenerationRequest, InstructionPlacement, OutputBudget,
    PromptAssembler,
};
pub use resolver::{ModelResolver, Resolution, ResolutionWarning, Scope};
pub use types::{CallSite, ModelSelection, ProviderConfig, ProviderName, TokenUsage};
pub use usage::{ScopeHistory, UsageError, UsageHistory, UsageRecord, UsageWindow};
pub use validators::{
    select_static, Domain, SelectionBounds, SelectionMethod, SelectionRecord, ValidatorSpec,
    WorkItem, CATALOG,
};
pub use verdict::{Issue, Severity, SeverityCounts, ValidationStatus, ValidationVerdict};
