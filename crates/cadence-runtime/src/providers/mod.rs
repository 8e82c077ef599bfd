//! Provider adapters.
//!
//! One adapter per backend family, all behind [`LlmProvider`]. Adapters hide
//! auth, request/response shape and usage field naming; every one of them
//! reports failures through the same [`ProviderError`] taxonomy.
//!
//! ## Security
//!
//! All adapters hold their key in an [`ApiCredential`], which never prints
//! the secret through `Debug` or `Display`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

use cadence_core::{ProviderName, TokenUsage};

mod factory;
mod http;
pub mod secrets;
pub mod structured;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{missing_credential_message, AdapterSource, CredentialLookup, ProviderFactory};
pub use http::status_error;
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "gemini")]
pub use gemini::GeminiProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

/// Errors from provider adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Missing, malformed or rejected credential
    #[error("{message}")]
    Auth { message: String },

    #[error(
        "{provider} rate limit exceeded{}",
        .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default()
    )]
    RateLimited {
        provider: ProviderName,
        retry_after: Option<Duration>,
    },

    /// Network failure, timeout or 5xx
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Output could not be parsed, or the request was rejected as malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The provider family was compiled out
    #[error("Provider unavailable: {0}")]
    Unsupported(String),
}

/// Error kind tag. Retry decisions branch on this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Transient,
    InvalidResponse,
    Unsupported,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate-limit",
            ErrorKind::Transient => "transient",
            ErrorKind::InvalidResponse => "invalid-response",
            ErrorKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth { .. } => ErrorKind::Auth,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimit,
            ProviderError::Transient(_) => ErrorKind::Transient,
            ProviderError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            ProviderError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ProviderError::Auth {
            message: message.into(),
        }
    }
}

/// Plain-text output of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model id as reported by the backend
    pub model: String,
}

/// Parsed, schema-checked output of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredCompletion {
    pub value: JsonValue,
    pub usage: TokenUsage,
    pub model: String,
}

/// Result of an explicit credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CredentialCheck {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }

    /// Interpret the outcome of a one-token ping call.
    ///
    /// A rate-limited ping still proves the key was accepted.
    pub fn from_ping(outcome: Result<(), ProviderError>) -> Self {
        match outcome {
            Ok(()) => Self::valid(),
            Err(ProviderError::RateLimited { .. }) => Self::valid(),
            Err(ProviderError::Transient(e)) => {
                Self::invalid(format!("could not verify credential: {}", e))
            }
            Err(e) => Self::invalid(e.to_string()),
        }
    }
}

/// Prompt used for credential pings.
pub const PING_PROMPT: &str = "Reply with OK.";

/// Capability interface shared by every backend family.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Plain-text generation.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        instructions: Option<&str>,
    ) -> Result<Completion, ProviderError>;

    /// Structured generation: the output must parse as JSON and satisfy
    /// `schema`, or the call fails with [`ProviderError::InvalidResponse`].
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &JsonValue,
        max_tokens: u32,
        instructions: Option<&str>,
    ) -> Result<StructuredCompletion, ProviderError> {
        let prompt = structured::with_schema_directive(prompt, schema);
        let completion = self.generate(&prompt, max_tokens, instructions).await?;
        structured::finish(completion, schema)
    }

    /// One real call to check the credential is accepted.
    async fn validate_credential(&self) -> CredentialCheck {
        CredentialCheck::from_ping(self.generate(PING_PROMPT, 1, None).await.map(|_| ()))
    }

    fn name(&self) -> ProviderName;

    /// Model id this adapter was built for.
    fn model(&self) -> &str;
}
