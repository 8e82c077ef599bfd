//! Anthropic Claude adapter (Messages API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cadence_core::{ProviderName, TokenUsage};

use super::http::post_json;
use super::secrets::ApiCredential;
use super::{Completion, LlmProvider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
///
/// The API key lives in an [`ApiCredential`] and is exposed only when the
/// request header is set.
pub struct AnthropicProvider {
    credential: ApiCredential,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(credential: ApiCredential, model: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            credential,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request<'a>(&'a self, prompt: &'a str, max_tokens: u32, system: Option<&'a str>) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Normalize a Messages API success body.
fn parse_body(body: &str, requested_model: &str) -> Result<Completion, ProviderError> {
    let parsed: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("unexpected claude response shape: {}", e)))?;

    let text = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        text,
        usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
        model: if parsed.model.is_empty() {
            requested_model.to_string()
        } else {
            parsed.model
        },
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        instructions: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let body = self.request(prompt, max_tokens, instructions);
        let url = format!("{}/messages", self.base_url);

        // Expose the credential only here, at the point of use
        let headers = [
            ("x-api-key", self.credential.expose()),
            ("anthropic-version", API_VERSION),
        ];
        let text = post_json(&self.client, ProviderName::Claude, &url, &headers, &body).await?;
        parse_body(&text, &self.model)
    }

    fn name(&self) -> ProviderName {
        ProviderName::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }
}
