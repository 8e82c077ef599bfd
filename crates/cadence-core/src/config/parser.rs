//! Ceremony configuration parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::ProviderName;

/// Errors that can occur when loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config validation failed: {0}")]
    Invalid(String),
}

/// On-disk format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` is JSON; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// A partial {provider, model} override. Each field inherits independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ModelOverride {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none()
    }
}

/// Per-stage overrides, optionally narrowed per validation type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Overrides keyed by validation type: a validator class ("universal",
    /// "domain"), a validator id, or "classification".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub validation: BTreeMap<String, ModelOverride>,
}

/// One ceremony's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderName>,

    #[serde(default, alias = "default_model", skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageEntry>,
}

impl CeremonyEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
            default_model: None,
            stages: BTreeMap::new(),
        }
    }
}

/// The persisted ceremony configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyConfig {
    /// Optional replacement for the hardcoded global default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<ModelOverride>,

    #[serde(default)]
    pub ceremonies: Vec<CeremonyEntry>,
}

impl CeremonyConfig {
    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: CeremonyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CeremonyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents, ConfigFormat::from_path(path))
    }

    /// Parse a config in the given format.
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Yaml => Self::from_yaml(contents),
            ConfigFormat::Json => Self::from_json(contents),
        }
    }

    /// Serialize in the given format.
    pub fn render(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    /// Look up a ceremony by name.
    pub fn ceremony(&self, name: &str) -> Option<&CeremonyEntry> {
        self.ceremonies.iter().find(|c| c.name == name)
    }

    /// Whether (ceremony, stage) has a validation-type override under `key`.
    pub fn has_validation_override(&self, ceremony: &str, stage: &str, key: &str) -> bool {
        self.ceremony(ceremony)
            .and_then(|c| c.stages.get(stage))
            .is_some_and(|s| s.validation.contains_key(key))
    }

    /// Look up a ceremony by name, mutably.
    pub fn ceremony_mut(&mut self, name: &str) -> Option<&mut CeremonyEntry> {
        self.ceremonies.iter_mut().find(|c| c.name == name)
    }

    /// Validate the config structure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for ceremony in &self.ceremonies {
            if ceremony.name.trim().is_empty() {
                return Err(ConfigError::Invalid("ceremony name must not be empty".to_string()));
            }

            if !seen.insert(ceremony.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate ceremony '{}'",
                    ceremony.name
                )));
            }

            check_model(&ceremony.default_model, &ceremony.name)?;

            for (stage_id, stage) in &ceremony.stages {
                let at = format!("{}.stages.{}", ceremony.name, stage_id);
                check_model(&stage.model, &at)?;

                for (validation_type, over) in &stage.validation {
                    check_model(&over.model, &format!("{}.validation.{}", at, validation_type))?;
                }
            }
        }

        if let Some(defaults) = &self.defaults {
            check_model(&defaults.model, "defaults")?;
        }

        Ok(())
    }
}

fn check_model(model: &Option<String>, at: &str) -> Result<(), ConfigError> {
    match model {
        Some(m) if m.trim().is_empty() => Err(ConfigError::Invalid(format!(
            "model at '{}' must not be empty",
            at
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
ceremonies:
  - name: sprint-planning
    provider: claude
    defaultModel: claude-sonnet-4-5
    stages:
      decomposition:
        model: claude-opus-4-1
      validation-domain:
        provider: openai
        model: gpt-4o
      validation:
        provider: gemini
        validation:
          universal:
            model: gemini-2.5-flash
  - name: seed
    provider: openai
    defaultModel: gpt-4o-mini
"#;

    #[test]
    fn test_parse_yaml() {
        let config = CeremonyConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(config.ceremonies.len(), 2);

        let planning = config.ceremony("sprint-planning").unwrap();
        assert_eq!(planning.provider, Some(ProviderName::Claude));
        assert_eq!(planning.default_model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(
            planning.stages["validation"].validation["universal"].model.as_deref(),
            Some("gemini-2.5-flash")
        );
    }

    #[test]
    fn test_has_validation_override() {
        let config = CeremonyConfig::from_yaml(SAMPLE_YAML).unwrap();
        assert!(config.has_validation_override("sprint-planning", "validation", "universal"));
        assert!(!config.has_validation_override("sprint-planning", "validation", "domain"));
        assert!(!config.has_validation_override("sprint-planning", "decomposition", "universal"));
        assert!(!config.has_validation_override("retro", "validation", "universal"));
    }

    #[test]
    fn test_parse_json_snake_case_alias() {
        let json = r#"{"ceremonies":[{"name":"seed","provider":"anthropic","default_model":"claude-haiku-4-5"}]}"#;
        let config = CeremonyConfig::from_json(json).unwrap();
        let seed = config.ceremony("seed").unwrap();
        assert_eq!(seed.provider, Some(ProviderName::Claude));
        assert_eq!(seed.default_model.as_deref(), Some("claude-haiku-4-5"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let yaml = "ceremonies:\n  - name: seed\n    provider: mistral\n";
        assert!(matches!(
            CeremonyConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_duplicate_ceremony_rejected() {
        let yaml = "ceremonies:\n  - name: seed\n  - name: seed\n";
        match CeremonyConfig::from_yaml(yaml) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("duplicate ceremony 'seed'")),
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_model_rejected() {
        let yaml = "ceremonies:\n  - name: seed\n    stages:\n      context:\n        model: \"\"\n";
        match CeremonyConfig::from_yaml(yaml) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("seed.stages.context")),
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_and_reparse_json() {
        let config = CeremonyConfig::from_yaml(SAMPLE_YAML).unwrap();
        let rendered = config.render(ConfigFormat::Json).unwrap();
        assert!(rendered.contains("\"defaultModel\""));
        assert_eq!(CeremonyConfig::from_json(&rendered).unwrap(), config);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/b.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a/b.yaml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a/b")), ConfigFormat::Yaml);
    }
}
