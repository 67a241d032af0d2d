//! LLM Provider abstractions for prephub-runtime.
//!
//! This module defines the trait every backend implements plus HTTP
//! implementations for Groq, Gemini and Hugging Face, each behind its own
//! cargo feature.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! Keys are wrapped in [`ApiCredential`] from the moment they are read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(any(feature = "groq", feature = "gemini", feature = "huggingface"))]
mod http;

#[cfg(feature = "groq")]
mod groq;

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "huggingface")]
mod huggingface;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "groq")]
pub use groq::{GroqProvider, GroqProviderFactory};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory};

#[cfg(feature = "huggingface")]
pub use huggingface::{HuggingFaceProvider, HuggingFaceProviderFactory};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// The external LLM services we integrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Gemini,
    #[serde(rename = "huggingface")]
    HuggingFace,
}

impl ProviderKind {
    /// All kinds in the default priority order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Groq,
        ProviderKind::Gemini,
        ProviderKind::HuggingFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Gemini => "gemini",
            ProviderKind::HuggingFace => "huggingface",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "gemini" => Ok(ProviderKind::Gemini),
            "huggingface" | "hugging_face" | "hf" => Ok(ProviderKind::HuggingFace),
            other => Err(format!("unknown provider kind '{}'", other)),
        }
    }
}

/// What the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Free-form text (markdown)
    Text,
    /// A JSON object or array
    Json,
}

impl ResponseShape {
    /// Sampling temperature used for this shape.
    pub fn temperature(&self) -> f32 {
        match self {
            ResponseShape::Text => 0.3,
            ResponseShape::Json => 0.2,
        }
    }
}

/// Per-call settings, derived from the backend's profile and the shape.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,

    /// Expected response shape; providers with a native JSON mode use it
    pub shape: ResponseShape,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            max_tokens: 4000,
            temperature: ResponseShape::Text.temperature(),
            timeout: Duration::from_secs(30),
            shape: ResponseShape::Text,
        }
    }
}

/// One message in an OpenAI-style chat. Roles are `system`, `user` and
/// `assistant`; each provider maps them onto its own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Raw text returned by one backend call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model that actually answered, when the API reports it
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token counts, reported or estimated. Logged at debug level only.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One callable LLM backend.
///
/// One instance wraps exactly one credential. Implementations must not
/// retry internally: a failed call moves the fallback walk on to the next
/// backend instead.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap local check that the backend is usable; no network call.
    async fn health_check(&self) -> bool;

    fn name(&self) -> &str;

    /// Rough token count for APIs that do not report usage (4 bytes each).
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}
