//! # prephub-runtime
//!
//! Multi-provider AI generation for PrepHub learning content.
//!
//! A single [`FallbackOrchestrator`] walks an ordered pool of LLM backends
//! (Groq keys, then Gemini, then Hugging Face by default), consulting a
//! two-tier [`ResponseCache`] first and optionally wrapping each call in a
//! [`ResilienceGuard`] (rate limiter plus circuit breaker). The first
//! usable response wins and is written back to the cache.
//!
//! [`ContentService`] sits on top and exposes the learning operations:
//! explanations, answers, quizzes, test cases, code analysis, translation,
//! learning paths and category grouping. Those never fail; when every
//! backend is down they return a labelled offline payload instead.
//!
//! ## Features
//!
//! Provider HTTP clients are behind cargo features: `groq`, `gemini`,
//! `huggingface`, or `all-providers`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use prephub_core::Level;
//! use prephub_runtime::{ContentService, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::load(None)?;
//! let service = ContentService::from_config(&config, &ProviderRegistry::with_defaults(), None);
//!
//! let explanation = service
//!     .generate_explanation("javascript", "Closures", "", "javascript", Level::Beginner)
//!     .await;
//! println!("{}", explanation.value);
//! ```

pub mod cache;
pub mod categorization;
pub mod config;
pub mod content;
pub mod orchestrator;
pub mod pool;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
mod testing;

pub use cache::{
    Clock, DurableStore, FileStore, ManualClock, MemoryStore, ResponseCache, StoreError,
    SystemClock,
};
pub use config::{ConfigError, RuntimeConfig};
pub use content::{Content, ContentOrigin, ContentService};
pub use orchestrator::{
    AttemptError, AttemptFailure, CachePolicy, FallbackOrchestrator, Generation, GenerationSource,
    OrchestratorError,
};
pub use pool::{Backend, BackendHealth, BackendId, BackendInfo, ProviderPool};
pub use providers::{
    ApiCredential, LlmProvider, ProviderError, ProviderKind, ProviderRegistry, ResponseShape,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardError, RateLimitConfig, RateLimiter,
    ResilienceGuard,
};
