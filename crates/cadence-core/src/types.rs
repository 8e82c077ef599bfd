//! Shared value types for provider selection and token accounting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider used when nothing else is configured.
pub const GLOBAL_DEFAULT_PROVIDER: ProviderName = ProviderName::Claude;

/// Model used when nothing else is configured.
pub const GLOBAL_DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Backend families cadence can drive.
///
/// This is a closed set: adding a backend means adding a variant here and
/// an adapter in `cadence-runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    /// Anthropic Messages API
    #[serde(alias = "anthropic")]
    Claude,
    /// OpenAI Chat Completions API
    #[serde(alias = "open-ai")]
    OpenAi,
    /// Google Gemini generateContent API
    #[serde(alias = "google")]
    Gemini,
}

impl ProviderName {
    /// All provider families, in a stable order.
    pub const ALL: [ProviderName; 3] = [ProviderName::Claude, ProviderName::OpenAi, ProviderName::Gemini];

    /// Environment variable holding this family's credential.
    pub fn credential_env_var(&self) -> &'static str {
        match self {
            ProviderName::Claude => "ANTHROPIC_API_KEY",
            ProviderName::OpenAi => "OPENAI_API_KEY",
            ProviderName::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Environment variable that overrides the API base URL.
    pub fn base_url_env_var(&self) -> &'static str {
        match self {
            ProviderName::Claude => "ANTHROPIC_BASE_URL",
            ProviderName::OpenAi => "OPENAI_BASE_URL",
            ProviderName::Gemini => "GEMINI_BASE_URL",
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Claude => "claude",
            ProviderName::OpenAi => "openai",
            ProviderName::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderName::Claude),
            "openai" | "open-ai" => Ok(ProviderName::OpenAi),
            "gemini" | "google" => Ok(ProviderName::Gemini),
            other => Err(format!(
                "Unknown provider '{}'. Available providers: claude, openai, gemini",
                other
            )),
        }
    }
}

/// A concrete, complete {provider, model} pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: ProviderName,
    pub model: String,
}

impl ModelSelection {
    pub fn new(provider: ProviderName, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// The hardcoded global fallback.
    pub fn global_default() -> Self {
        Self::new(GLOBAL_DEFAULT_PROVIDER, GLOBAL_DEFAULT_MODEL)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Everything needed to construct an adapter for a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub model_id: String,
    pub credential_env_var: &'static str,
}

impl From<&ModelSelection> for ProviderConfig {
    fn from(selection: &ModelSelection) -> Self {
        Self {
            name: selection.provider,
            model_id: selection.model.clone(),
            credential_env_var: selection.provider.credential_env_var(),
        }
    }
}

/// Where in a ceremony a generation call happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    pub ceremony: String,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_type: Option<String>,
}

impl CallSite {
    pub fn new(ceremony: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            ceremony: ceremony.into(),
            stage: stage.into(),
            validation_type: None,
        }
    }

    /// Narrow the call site to a validation type.
    pub fn with_validation_type(mut self, validation_type: impl Into<String>) -> Self {
        self.validation_type = Some(validation_type.into());
        self
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.validation_type {
            Some(vt) => write!(f, "{}:{}:{}", self.ceremony, self.stage, vt),
            None => write!(f, "{}:{}", self.ceremony, self.stage),
        }
    }
}

/// Token usage normalized across backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
