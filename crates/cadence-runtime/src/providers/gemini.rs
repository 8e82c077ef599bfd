//! Google Gemini adapter (generateContent API).
//!
//! Structured calls set `responseMimeType: application/json`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use cadence_core::{ProviderName, TokenUsage};

use super::http::post_json;
use super::secrets::ApiCredential;
use super::structured;
use super::{Completion, LlmProvider, ProviderError, StructuredCompletion};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    credential: ApiCredential,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
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
        &self,
        prompt: &'a str,
        max_tokens: u32,
        system: Option<&'a str>,
        json_mode: bool,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
                response_mime_type: json_mode.then_some("application/json"),
            },
        }
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let headers = [("x-goog-api-key", self.credential.expose())];
        let text = post_json(&self.client, ProviderName::Gemini, &url, &headers, request).await?;
        parse_body(&text, &self.model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    #[serde(default)]
    model_version: String,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn parse_body(body: &str, requested_model: &str) -> Result<Completion, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("unexpected gemini response shape: {}", e)))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::InvalidResponse(format!("gemini blocked the prompt: {}", reason)));
    }

    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ProviderError::InvalidResponse("gemini returned no candidates".to_string()))?;

    let text = content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        text,
        usage: TokenUsage::new(
            parsed.usage_metadata.prompt_token_count,
            parsed.usage_metadata.candidates_token_count,
        ),
        model: if parsed.model_version.is_empty() {
            requested_model.to_string()
        } else {
            parsed.model_version
        },
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
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
        ProviderName::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }
}
