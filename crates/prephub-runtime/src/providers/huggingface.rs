//! Hugging Face inference provider implementation.
//!
//! The hosted text-generation endpoint takes a single prompt string, so the
//! chat transcript is flattened into one instruction block.

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

const JSON_SUFFIX: &str = "RETURN JSON ONLY.";

/// Hugging Face inference provider, bound to one API token.
pub struct HuggingFaceProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HuggingFaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HuggingFaceProvider {
    /// Create a provider with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_profile(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Hugging Face API key"),
            &ProviderProfile::defaults_for(ProviderKind::HuggingFace),
        )
    }

    /// Create from a credential and resolved settings.
    pub fn from_profile(credential: ApiCredential, profile: &ProviderProfile) -> Self {
        Self {
            credential,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}", self.base_url, model)
    }

    fn build_request(messages: &[ChatMessage], config: &CompletionConfig) -> HfRequest {
        HfRequest {
            inputs: instruction_prompt(messages, config.shape),
            parameters: HfParameters {
                max_new_tokens: config.max_tokens,
                temperature: config.temperature,
                return_full_text: false,
            },
        }
    }
}

/// Wrap the transcript in the instruct template.
fn instruction_prompt(messages: &[ChatMessage], shape: ResponseShape) -> String {
    let mut body = messages
        .iter()
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if shape == ResponseShape::Json {
        body.push_str("\n\n");
        body.push_str(JSON_SUFFIX);
    }
    format!("<s>[INST] {} [/INST]", body)
}

#[derive(Debug, Serialize)]
struct HfRequest {
    inputs: String,
    parameters: HfParameters,
}

#[derive(Debug, Serialize)]
struct HfParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct HfGenerated {
    #[serde(default)]
    generated_text: String,
}

/// The endpoint answers with either a list or a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HfResponse {
    Many(Vec<HfGenerated>),
    One(HfGenerated),
}

impl HfResponse {
    fn into_text(self) -> String {
        match self {
            HfResponse::Many(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .unwrap_or_default(),
            HfResponse::One(g) => g.generated_text,
        }
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = Self::build_request(&messages, config);

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(self.endpoint(&config.model))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::transport_error(e, config.timeout))?;

        let body: HfResponse = http::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body.into_text();
        let usage = TokenUsage {
            prompt_tokens: self.estimate_tokens(&request.inputs),
            completion_tokens: self.estimate_tokens(&content),
        };

        Ok(CompletionResponse {
            content,
            usage,
            model: config.model.clone(),
            stop_reason: None,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

/// Factory for Hugging Face providers.
pub struct HuggingFaceProviderFactory;

impl ProviderFactory for HuggingFaceProviderFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HuggingFace
    }

    fn create(
        &self,
        credential: ApiCredential,
        profile: &ProviderProfile,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(HuggingFaceProvider::from_profile(credential, profile)))
    }

    fn description(&self) -> &'static str {
        "Hugging Face hosted text-generation inference"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_prompt_text() {
        let prompt = instruction_prompt(&[ChatMessage::user("Explain recursion.")], ResponseShape::Text);
        assert_eq!(prompt, "<s>[INST] Explain recursion. [/INST]");
    }

    #[test]
    fn test_instruction_prompt_json_suffix() {
        let prompt = instruction_prompt(
            &[ChatMessage::system("You write quizzes."), ChatMessage::user("Quiz on loops.")],
            ResponseShape::Json,
        );
        assert!(prompt.starts_with("<s>[INST] You write quizzes.\n\nQuiz on loops."));
        assert!(prompt.ends_with("RETURN JSON ONLY. [/INST]"));
    }

    #[test]
    fn test_request_parameters() {
        let request =
            HuggingFaceProvider::build_request(&[ChatMessage::user("q")], &CompletionConfig::default());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["parameters"]["max_new_tokens"], 4000);
        assert_eq!(body["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_response_forms() {
        let many: HfResponse = serde_json::from_str(r#"[{"generated_text": "from list"}]"#).unwrap();
        assert_eq!(many.into_text(), "from list");

        let one: HfResponse = serde_json::from_str(r#"{"generated_text": "from object"}"#).unwrap();
        assert_eq!(one.into_text(), "from object");

        let empty: HfResponse = serde_json::from_str("[]").unwrap();
        assert_eq!(empty.into_text(), "");
    }

    #[test]
    fn test_endpoint_uses_model_path() {
        let provider = HuggingFaceProvider::new("hf_key");
        assert_eq!(
            provider.endpoint("mistralai/Mistral-7B-Instruct-v0.3"),
            "https://router.huggingface.co/hf-inference/models/mistralai/Mistral-7B-Instruct-v0.3"
        );
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "hf_super_secret_token";
        let debug_output = format!("{:?}", HuggingFaceProvider::new(secret_key));
        assert!(!debug_output.contains(secret_key));
    }
}
