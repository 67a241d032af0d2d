//! Provider factory pattern for building backends from configuration.
//!
//! Each provider kind registers one factory. The pool asks the registry for
//! one provider instance per discovered credential.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let profile = config.provider(ProviderKind::Groq);
//! for credential in ApiCredential::all_from_env(&profile.api_key_env, "Groq API key") {
//!     let provider = registry.create(ProviderKind::Groq, credential, &profile)?;
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ApiCredential, LlmProvider, ProviderError, ProviderKind};
use crate::config::ProviderProfile;

/// Factory for creating LLM providers of one kind.
pub trait ProviderFactory: Send + Sync {
    /// The kind this factory builds.
    fn kind(&self) -> ProviderKind;

    /// Create a provider bound to a single credential.
    fn create(
        &self,
        credential: ApiCredential,
        profile: &ProviderProfile,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate settings without creating a provider.
    fn validate_config(&self, profile: &ProviderProfile) -> Result<(), ProviderError> {
        if !profile.base_url.starts_with("http://") && !profile.base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
        if profile.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} model must not be empty",
                self.kind()
            )));
        }
        Ok(())
    }

    /// Default settings for this kind.
    fn default_settings(&self) -> ProviderProfile {
        ProviderProfile::defaults_for(self.kind())
    }

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<ProviderKind, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory for the same kind already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    /// Create a provider of `kind` bound to `credential`.
    pub fn create(
        &self,
        kind: ProviderKind,
        credential: ApiCredential,
        profile: &ProviderProfile,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factories.get(&kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                kind,
                self.available_kinds()
            ))
        })?;
        factory.validate_config(profile)?;
        factory.create(credential, profile)
    }

    /// Validate settings for a provider kind.
    pub fn validate(&self, kind: ProviderKind, profile: &ProviderProfile) -> Result<(), ProviderError> {
        self.factories
            .get(&kind)
            .ok_or_else(|| ProviderError::NotConfigured(format!("Unknown provider type: '{}'", kind)))?
            .validate_config(profile)
    }

    /// List registered provider kinds.
    pub fn available_kinds(&self) -> Vec<ProviderKind> {
        self.factories.keys().copied().collect()
    }

    /// Check if a provider kind is registered.
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Get the factory for a provider kind.
    pub fn get_factory(&self, kind: ProviderKind) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories.get(&kind)
    }

    /// Create a registry with every provider compiled into this build.
    #[allow(unused_mut)]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "groq")]
        registry.register(Arc::new(super::GroqProviderFactory));
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        #[cfg(feature = "huggingface")]
        registry.register(Arc::new(super::HuggingFaceProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, CredentialSource, TokenUsage,
    };
    use async_trait::async_trait;

    struct EchoProvider {
        name: String,
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct EchoFactory;

    impl ProviderFactory for EchoFactory {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        fn create(
            &self,
            credential: ApiCredential,
            profile: &ProviderProfile,
        ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Ok(Arc::new(EchoProvider {
                name: format!("{}@{}", profile.model, credential.source()),
            }))
        }

        fn description(&self) -> &'static str {
            "Echo provider for testing"
        }
    }

    fn credential() -> ApiCredential {
        ApiCredential::new("k", CredentialSource::Programmatic, "Test key")
    }

    #[test]
    fn test_registry_register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory));

        assert!(registry.has_provider(ProviderKind::Gemini));
        assert!(!registry.has_provider(ProviderKind::Groq));

        let profile = ProviderProfile::defaults_for(ProviderKind::Gemini);
        let provider = registry
            .create(ProviderKind::Gemini, credential(), &profile)
            .unwrap();
        assert_eq!(provider.name(), "gemini-2.0-flash-exp@programmatic");
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();
        let profile = ProviderProfile::defaults_for(ProviderKind::Groq);

        match registry.create(ProviderKind::Groq, credential(), &profile) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown provider type"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_registry_rejects_bad_base_url() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory));

        let mut profile = ProviderProfile::defaults_for(ProviderKind::Gemini);
        profile.base_url = "invalid-url".to_string();
        assert!(registry.validate(ProviderKind::Gemini, &profile).is_err());
        assert!(registry
            .create(ProviderKind::Gemini, credential(), &profile)
            .is_err());
    }

    #[test]
    fn test_registry_available_kinds() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.available_kinds().is_empty());

        registry.register(Arc::new(EchoFactory));
        assert_eq!(registry.available_kinds(), vec![ProviderKind::Gemini]);
        assert_eq!(
            registry
                .get_factory(ProviderKind::Gemini)
                .map(|f| f.description()),
            Some("Echo provider for testing")
        );
    }
}
