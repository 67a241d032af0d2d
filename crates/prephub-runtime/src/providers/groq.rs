//! Groq provider implementation.
//!
//! Groq serves an OpenAI-compatible chat completions endpoint. Structured
//! calls use its native JSON mode unless disabled in config.
//!
//! ## Security
//!
//! This provider uses the centralized [`ApiCredential`] system for secure
//! credential handling. See the [`secrets`](super::secrets) module for details.

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

/// Groq chat completions provider, bound to one API key.
pub struct GroqProvider {
    credential: ApiCredential,
    base_url: String,
    json_mode: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

impl GroqProvider {
    /// Create a provider with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_profile(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Groq API key"),
            &ProviderProfile::defaults_for(ProviderKind::Groq),
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

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, messages: Vec<ChatMessage>, config: &CompletionConfig) -> GroqRequest {
        let response_format = (self.json_mode && config.shape == ResponseShape::Json).then(|| {
            ResponseFormat {
                type_: "json_object".to_string(),
            }
        });

        GroqRequest {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            response_format,
        }
    }
}

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct GroqRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: String,
}

/// Chat completions response body.
#[derive(Debug, Deserialize)]
struct GroqResponse {
    choices: Vec<GroqChoice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<GroqUsage>,
}

#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: GroqMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = self.build_request(messages, config);

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::transport_error(e, config.timeout))?;

        let body: GroqResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;
        let usage = body.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Factory for Groq providers.
pub struct GroqProviderFactory;

impl ProviderFactory for GroqProviderFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn create(
        &self,
        credential: ApiCredential,
        profile: &ProviderProfile,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GroqProvider::from_profile(credential, profile)))
    }

    fn description(&self) -> &'static str {
        "Groq OpenAI-compatible chat completions with JSON mode"
    }
}
