//! Ordered pool of callable backends.
//!
//! A backend is one provider kind bound to one credential. The pool keeps
//! them in fallback order: every credential of the first configured kind
//! (in numbered-variable order), then the next kind, and so on.

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderProfile, RuntimeConfig};
use crate::providers::{
    ApiCredential, ChatMessage, CompletionConfig, LlmProvider, ProviderError, ProviderKind,
    ProviderRegistry, ResponseShape,
};

/// Stable identity of a backend, e.g. `groq-2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BackendId {
    pub kind: ProviderKind,
    /// 1-based position among the kind's credentials
    pub index: usize,
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.index)
    }
}

/// One callable backend.
#[derive(Clone)]
pub struct Backend {
    pub id: BackendId,
    pub model: String,
    pub max_tokens: u32,
    /// Hard bound on a single invocation
    pub timeout: Duration,
    provider: Arc<dyn LlmProvider>,
}

impl Backend {
    pub fn new(id: BackendId, profile: &ProviderProfile, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            id,
            model: profile.model.clone(),
            max_tokens: profile.max_tokens,
            timeout: profile.timeout,
            provider,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.id.kind
    }

    fn completion_config(&self, shape: ResponseShape) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: shape.temperature(),
            timeout: self.timeout,
            shape,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Description of a backend for listings.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
}

/// Reachability of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    #[serde(flatten)]
    pub backend: BackendInfo,
    pub healthy: bool,
}

/// Backends in fallback order.
#[derive(Debug, Clone, Default)]
pub struct ProviderPool {
    backends: Vec<Backend>,
}

impl ProviderPool {
    pub fn new(backends: Vec<Backend>) -> Self {
        Self { backends }
    }

    /// Build the pool from config, reading credentials from the environment.
    pub fn from_config(config: &RuntimeConfig, registry: &ProviderRegistry) -> Self {
        Self::from_credentials(config, registry, |kind, profile| {
            ApiCredential::all_from_env(&profile.api_key_env, credential_name(kind))
        })
    }

    /// Build the pool with an explicit credential source.
    ///
    /// Kinds without credentials, or without a registered factory,
    /// contribute no backends. An empty pool is logged, not rejected.
    pub fn from_credentials<F>(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
        mut credentials: F,
    ) -> Self
    where
        F: FnMut(ProviderKind, &ProviderProfile) -> Vec<ApiCredential>,
    {
        let mut backends = Vec::new();
        for &kind in &config.provider_order {
            let profile = config.provider(kind);
            let creds = credentials(kind, &profile);
            if creds.is_empty() {
                tracing::debug!(provider = %kind, env = %profile.api_key_env, "No credentials found");
                continue;
            }
            if !registry.has_provider(kind) {
                tracing::warn!(
                    provider = %kind,
                    "Credentials present but provider support is not compiled in"
                );
                continue;
            }

            for (i, credential) in creds.into_iter().enumerate() {
                let id = BackendId { kind, index: i + 1 };
                match registry.create(kind, credential, &profile) {
                    Ok(provider) => backends.push(Backend::new(id, &profile, provider)),
                    Err(e) => {
                        tracing::warn!(backend = %id, error = %e, "Skipping backend");
                    }
                }
            }
        }

        if backends.is_empty() {
            tracing::warn!(
                "No AI providers configured; every generation will use offline content"
            );
        } else {
            tracing::info!(
                backends = backends.len(),
                order = %backends.iter().map(|b| b.id.to_string()).collect::<Vec<_>>().join(","),
                "Provider pool ready"
            );
        }
        Self { backends }
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn describe(&self) -> Vec<BackendInfo> {
        self.backends
            .iter()
            .map(|b| BackendInfo {
                id: b.id.to_string(),
                kind: b.kind(),
                model: b.model.clone(),
            })
            .collect()
    }

    /// Probe every backend concurrently, bounded by each backend's timeout.
    pub async fn health_check(&self) -> Vec<BackendHealth> {
        let probes = self.backends.iter().map(|b| async move {
            let healthy = tokio::time::timeout(b.timeout, b.provider.health_check())
                .await
                .unwrap_or(false);
            if !healthy {
                tracing::warn!(backend = %b.id, "Backend failed health check");
            }
            healthy
        });
        let results = join_all(probes).await;

        self.describe()
            .into_iter()
            .zip(results)
            .map(|(backend, healthy)| BackendHealth { backend, healthy })
            .collect()
    }

    /// Send `prompt` to one backend and return its raw text.
    ///
    /// No retries. The call is cut off at the backend's timeout.
    pub async fn invoke(
        &self,
        backend: &Backend,
        prompt: &str,
        shape: ResponseShape,
    ) -> Result<String, ProviderError> {
        let config = backend.completion_config(shape);
        let messages = vec![ChatMessage::user(prompt)];

        match tokio::time::timeout(backend.timeout, backend.provider.complete(messages, &config))
            .await
        {
            Ok(Ok(response)) => {
                tracing::debug!(
                    backend = %backend.id,
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    "Backend responded"
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(backend.timeout)),
        }
    }
}

fn credential_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => "Groq API key",
        ProviderKind::Gemini => "Gemini API key",
        ProviderKind::HuggingFace => "Hugging Face API key",
    }
}
