//! Hierarchical model resolution.
//!
//! Resolution order, first match wins, applied to provider and model
//! independently:
//! 1. validation-type override for (ceremony, stage, validation type)
//! 2. stage override for (ceremony, stage)
//! 3. ceremony default
//! 4. global default (config `defaults`, then the hardcoded fallback)
//!
//! Resolution never fails. Unmatched configuration falls back with a
//! logged [`ResolutionWarning`].

use serde::Serialize;

use crate::config::{CeremonyConfig, CeremonyEntry, ModelOverride, StageEntry};
use crate::types::{CallSite, ModelSelection, ProviderName, GLOBAL_DEFAULT_MODEL, GLOBAL_DEFAULT_PROVIDER};

/// Which configuration scope supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    ValidationType,
    Stage,
    Ceremony,
    Global,
}

/// Non-fatal resolution problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolutionWarning {
    /// The ceremony is not configured; the global default was used.
    UnknownCeremony { ceremony: String },

    /// The provider came from a narrower scope than the model, so the model
    /// may belong to a different provider family.
    ProviderWithoutModel {
        provider_scope: Scope,
        model_scope: Scope,
    },
}

impl std::fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionWarning::UnknownCeremony { ceremony } => {
                write!(f, "ceremony '{}' is not configured, using global default", ceremony)
            }
            ResolutionWarning::ProviderWithoutModel {
                provider_scope,
                model_scope,
            } => write!(
                f,
                "provider overridden at {:?} scope but model inherited from {:?} scope",
                provider_scope, model_scope
            ),
        }
    }
}

/// The outcome of resolving one call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub selection: ModelSelection,
    pub provider_scope: Scope,
    pub model_scope: Scope,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolutionWarning>,
}

/// Pure lookup over a configuration snapshot.
pub struct ModelResolver<'a> {
    config: &'a CeremonyConfig,
}

impl<'a> ModelResolver<'a> {
    pub fn new(config: &'a CeremonyConfig) -> Self {
        Self { config }
    }

    /// Resolve a call site to a complete {provider, model} pair.
    pub fn resolve(&self, site: &CallSite) -> Resolution {
        let mut warnings = Vec::new();

        let ceremony = self.config.ceremony(&site.ceremony);
        if ceremony.is_none() {
            warnings.push(ResolutionWarning::UnknownCeremony {
                ceremony: site.ceremony.clone(),
            });
        }

        let stage = ceremony.and_then(|c| c.stages.get(&site.stage));
        let validation = match (stage, &site.validation_type) {
            (Some(s), Some(vt)) => s.validation.get(vt),
            _ => None,
        };

        let layers = Layers {
            validation,
            stage,
            ceremony,
            defaults: self.config.defaults.as_ref(),
        };

        let (provider, provider_scope) = layers.provider();
        let (model, model_scope) = layers.model();

        if provider_scope < model_scope {
            warnings.push(ResolutionWarning::ProviderWithoutModel {
                provider_scope,
                model_scope,
            });
        }

        for warning in &warnings {
            tracing::warn!(
                ceremony = %site.ceremony,
                stage = %site.stage,
                validation_type = ?site.validation_type,
                "{}",
                warning
            );
        }

        Resolution {
            selection: ModelSelection::new(provider, model),
            provider_scope,
            model_scope,
            warnings,
        }
    }

    /// Every distinct selection a ceremony can resolve to, with the call
    /// sites that produce it. Unknown ceremonies yield the global default.
    pub fn ceremony_selections(&self, ceremony: &str) -> Vec<(CallSite, ModelSelection)> {
        let mut sites = vec![CallSite::new(ceremony, "")];

        if let Some(entry) = self.config.ceremony(ceremony) {
            for (stage_id, stage) in &entry.stages {
                sites.push(CallSite::new(ceremony, stage_id.clone()));
                for validation_type in stage.validation.keys() {
                    sites.push(
                        CallSite::new(ceremony, stage_id.clone())
                            .with_validation_type(validation_type.clone()),
                    );
                }
            }
        }

        let mut out: Vec<(CallSite, ModelSelection)> = Vec::new();
        for site in sites {
            let selection = self.resolve(&site).selection;
            if !out.iter().any(|(_, s)| *s == selection) {
                out.push((site, selection));
            }
        }
        out
    }
}

struct Layers<'a> {
    validation: Option<&'a ModelOverride>,
    stage: Option<&'a StageEntry>,
    ceremony: Option<&'a CeremonyEntry>,
    defaults: Option<&'a ModelOverride>,
}

impl Layers<'_> {
    fn provider(&self) -> (ProviderName, Scope) {
        if let Some(p) = self.validation.and_then(|v| v.provider) {
            return (p, Scope::ValidationType);
        }
        if let Some(p) = self.stage.and_then(|s| s.provider) {
            return (p, Scope::Stage);
        }
        if let Some(p) = self.ceremony.and_then(|c| c.provider) {
            return (p, Scope::Ceremony);
        }
        let global = self
            .defaults
            .and_then(|d| d.provider)
            .unwrap_or(GLOBAL_DEFAULT_PROVIDER);
        (global, Scope::Global)
    }

    fn model(&self) -> (String, Scope) {
        if let Some(m) = self.validation.and_then(|v| v.model.clone()) {
            return (m, Scope::ValidationType);
        }
        if let Some(m) = self.stage.and_then(|s| s.model.clone()) {
            return (m, Scope::Stage);
        }
        if let Some(m) = self.ceremony.and_then(|c| c.default_model.clone()) {
            return (m, Scope::Ceremony);
        }
        let global = self
            .defaults
            .and_then(|d| d.model.clone())
            .unwrap_or_else(|| GLOBAL_DEFAULT_MODEL.to_string());
        (global, Scope::Global)
    }
}
