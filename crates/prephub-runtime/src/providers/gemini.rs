//! Google Gemini provider implementation.
//!
//! Talks to the `generateContent` REST endpoint. System messages become the
//! request's `systemInstruction`.

use super::{
    factory::ProviderFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ProviderKind,
    ResponseShape, TokenUsage,
};
use crate::config::ProviderProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gemini provider, bound to one API key.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    json_mode: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_profile(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Gemini API key"),
            &ProviderProfile::defaults_for(ProviderKind::Gemini),
        )
    }

    /// Create from a credential and resolved settings.
    pub fn from_profile(credential: ApiCredential, profile: &ProviderProfile) -> Self {
        Self {
            credential,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            json_mode: profile.json_mode,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn build_request(&self, messages: Vec<ChatMessage>, config: &CompletionConfig) -> GeminiRequest {
        let mut system = Vec::new();
        let mut contents = Vec::new();
        for msg in messages {
            match msg.role.as_str() {
                "system" => system.push(Part { text: msg.content }),
                "assistant" => contents.push(Content {
                    role: "model".to_string(),
                    parts: vec![Part { text: msg.content }],
                }),
                _ => contents.push(Content {
                    role: "user".to_string(),
                    parts: vec![Part { text: msg.content }],
                }),
            }
        }

        GeminiRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| SystemInstruction { parts: system }),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
                response_mime_type: (self.json_mode && config.shape == ResponseShape::Json)
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = self.build_request(messages, config);

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::transport_error(e, config.timeout))?;

        let body: GeminiResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body.text();
        let usage = body.usage_metadata.as_ref().map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        });

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model_version.unwrap_or_else(|| config.model.clone()),
            stop_reason: body.candidates.into_iter().next().and_then(|c| c.finish_reason),
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn create(
        &self,
        credential: ApiCredential,
        profile: &ProviderProfile,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_profile(credential, profile)))
    }

    fn description(&self) -> &'static str {
        "Google Gemini generateContent API"
    }
}
