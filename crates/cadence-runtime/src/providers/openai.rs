//! OpenAI adapter (Chat Completions API).
//!
//! Structured calls turn on JSON mode (`response_format: json_object`) in
//! addition to the schema directive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use cadence_core::{ProviderName, TokenUsage};

use super::http::post_json;
use super::secrets::ApiCredential;
use super::structured;
use super::{Completion, LlmProvider, ProviderError, StructuredCompletion};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    credential: ApiCredential,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(credential: ApiCredential, model: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            credential,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request<'a>(
        &'a self,
        prompt: &'a str,
        max_tokens: u32,
        system: Option<&'a str>,
        json_mode: bool,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: &self.model,
            max_completion_tokens: max_tokens,
            messages,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let bearer = format!("Bearer {}", self.credential.expose());
        let headers = [("authorization", bearer.as_str())];
        let text = post_json(&self.client, ProviderName::OpenAi, &url, &headers, request).await?;
        parse_body(&text, &self.model)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_completion_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn parse_body(body: &str, requested_model: &str) -> Result<Completion, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("unexpected openai response shape: {}", e)))?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ProviderError::InvalidResponse("openai returned no choices".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(ProviderError::InvalidResponse(format!("openai refused: {}", refusal)));
    }

    Ok(Completion {
        text: message.content.unwrap_or_default(),
        usage: TokenUsage::new(parsed.usage.prompt_tokens, parsed.usage.completion_tokens),
        model: if parsed.model.is_empty() {
            requested_model.to_string()
        } else {
            parsed.model
        },
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        instructions: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        self.send(&self.request(prompt, max_tokens, instructions, false)).await
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &JsonValue,
        max_tokens: u32,
        instructions: Option<&str>,
    ) -> Result<StructuredCompletion, ProviderError> {
        let prompt = structured::with_schema_directive(prompt, schema);
        let completion = self
            .send(&self.request(&prompt, max_tokens, instructions, true))
            .await?;
        structured::finish(completion, schema)
    }

    fn name(&self) -> ProviderName {
        ProviderName::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }
}
