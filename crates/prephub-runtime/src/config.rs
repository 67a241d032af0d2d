//! Runtime configuration.
//!
//! Everything except credentials can be set from a YAML file; credentials
//! only ever come from the environment. Durations are written the human
//! way (`30s`, `10m`, `7d`) or as a bare number of seconds.
//!
//! ```yaml
//! provider_order: [groq, gemini, huggingface]
//! providers:
//!   gemini:
//!     model: gemini-2.0-flash
//! ttl:
//!   answer: 5m
//! guard:
//!   enabled: [groq]
//!   breaker:
//!     reset_timeout: 2m
//! overall_deadline: 90s
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::providers::ProviderKind;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig};

/// Errors from configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Priority order of provider kinds for the fallback walk
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<ProviderKind>,

    /// Per-kind provider overrides
    #[serde(default)]
    pub providers: BTreeMap<ProviderKind, ProviderSettings>,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Call-site TTLs
    #[serde(default)]
    pub ttl: CacheTtls,

    #[serde(default)]
    pub guard: GuardConfig,

    /// Upper bound on one complete fallback walk
    #[serde(default, with = "duration_str::option")]
    pub overall_deadline: Option<Duration>,

    #[serde(default)]
    pub categorization: CategorizationConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider_order: default_provider_order(),
            providers: BTreeMap::new(),
            cache: CacheConfig::default(),
            ttl: CacheTtls::default(),
            guard: GuardConfig::default(),
            overall_deadline: None,
            categorization: CategorizationConfig::default(),
        }
    }
}

fn default_provider_order() -> Vec<ProviderKind> {
    ProviderKind::ALL.to_vec()
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from `path` if given and present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::from_yaml_file(p),
            Some(p) => {
                tracing::info!(path = %p.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolved settings for one provider kind.
    pub fn provider(&self, kind: ProviderKind) -> ProviderProfile {
        self.providers
            .get(&kind)
            .cloned()
            .unwrap_or_default()
            .resolve(kind)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for kind in &self.provider_order {
            if !seen.insert(*kind) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' listed twice in provider_order",
                    kind
                )));
            }
        }

        for kind in ProviderKind::ALL {
            let profile = self.provider(kind);
            if !profile.base_url.starts_with("http://") && !profile.base_url.starts_with("https://")
            {
                return Err(ConfigError::Invalid(format!(
                    "{} base_url must start with http:// or https://",
                    kind
                )));
            }
        }

        let breaker = &self.guard.breaker;
        if breaker.error_threshold_percentage == 0 || breaker.error_threshold_percentage > 100 {
            return Err(ConfigError::Invalid(
                "guard.breaker.error_threshold_percentage must be within 1..=100".to_string(),
            ));
        }
        if breaker.rolling_buckets == 0 || breaker.rolling_window.is_zero() {
            return Err(ConfigError::Invalid(
                "guard.breaker rolling window must be non-empty".to_string(),
            ));
        }

        for (kind, limit) in &self.guard.rate_limits {
            if limit.points == 0 || limit.duration.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "guard.rate_limits.{} needs at least one point per non-zero duration",
                    kind
                )));
            }
        }

        Ok(())
    }
}

/// Optional per-kind overrides as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Base environment variable; `_2`..`_9` suffixes are scanned too
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default, with = "duration_str::option")]
    pub timeout: Option<Duration>,

    /// Ask the provider for native JSON output on structured calls
    #[serde(default)]
    pub json_mode: Option<bool>,
}

impl ProviderSettings {
    /// Fill every unset field with the kind's default.
    pub fn resolve(self, kind: ProviderKind) -> ProviderProfile {
        let defaults = ProviderProfile::defaults_for(kind);
        ProviderProfile {
            model: self.model.unwrap_or(defaults.model),
            base_url: self.base_url.unwrap_or(defaults.base_url),
            api_key_env: self.api_key_env.unwrap_or(defaults.api_key_env),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            json_mode: self.json_mode.unwrap_or(defaults.json_mode),
        }
    }
}

/// Fully-resolved provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub json_mode: bool,
}

impl ProviderProfile {
    /// Built-in defaults per kind.
    pub fn defaults_for(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Groq => Self {
                model: "llama-3.3-70b-versatile".to_string(),
                base_url: "https://api.groq.com/openai/v1".to_string(),
                api_key_env: "GROQ_API_KEY".to_string(),
                max_tokens: 4000,
                timeout: Duration::from_secs(30),
                json_mode: true,
            },
            ProviderKind::Gemini => Self {
                model: "gemini-2.0-flash-exp".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                max_tokens: 4000,
                timeout: Duration::from_secs(30),
                json_mode: false,
            },
            ProviderKind::HuggingFace => Self {
                model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
                base_url: "https://router.huggingface.co/hf-inference/models".to_string(),
                api_key_env: "HUGGING_FACE_API_KEY".to_string(),
                max_tokens: 4000,
                timeout: Duration::from_secs(60),
                json_mode: false,
            },
        }
    }
}

/// Fast-tier cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of fast-tier entries, independent of the call-site TTL
    #[serde(default = "default_fast_ttl", with = "duration_str")]
    pub fast_ttl: Duration,

    #[serde(default = "default_fast_capacity")]
    pub fast_capacity: u64,
}

fn default_fast_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_fast_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast_ttl: default_fast_ttl(),
            fast_capacity: default_fast_capacity(),
        }
    }
}

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Call-site cache TTLs, chosen by how volatile each kind of content is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    #[serde(with = "duration_str")]
    pub explanation: Duration,
    #[serde(with = "duration_str")]
    pub answer: Duration,
    #[serde(with = "duration_str")]
    pub quiz: Duration,
    #[serde(with = "duration_str")]
    pub test_cases: Duration,
    #[serde(with = "duration_str")]
    pub code_analysis: Duration,
    #[serde(with = "duration_str")]
    pub translation: Duration,
    #[serde(with = "duration_str")]
    pub learning_path: Duration,
    #[serde(with = "duration_str")]
    pub categorization: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            explanation: Duration::from_secs(7 * DAY),
            answer: Duration::from_secs(600),
            quiz: Duration::from_secs(7 * DAY),
            test_cases: Duration::from_secs(7 * DAY),
            code_analysis: Duration::from_secs(HOUR),
            translation: Duration::from_secs(7 * DAY),
            learning_path: Duration::from_secs(7 * DAY),
            categorization: Duration::from_secs(30 * DAY),
        }
    }
}

/// Where and how the resilience guard applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Provider kinds whose calls go through the guard
    #[serde(default = "default_provider_order")]
    pub enabled: Vec<ProviderKind>,

    #[serde(default)]
    pub breaker: CircuitBreakerConfig,

    /// Per-kind overrides; unset kinds use [`RateLimitConfig::default_for`]
    #[serde(default)]
    pub rate_limits: BTreeMap<ProviderKind, RateLimitConfig>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: default_provider_order(),
            breaker: CircuitBreakerConfig::default(),
            rate_limits: BTreeMap::new(),
        }
    }
}

impl GuardConfig {
    /// Rate limit for a kind, falling back to the built-in default.
    pub fn rate_limit(&self, kind: ProviderKind) -> RateLimitConfig {
        self.rate_limits
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| RateLimitConfig::default_for(kind))
    }

    pub fn is_enabled(&self, kind: ProviderKind) -> bool {
        self.enabled.contains(&kind)
    }
}

/// Category grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationConfig {
    /// Assignments below this confidence (0-100) are not accepted
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    40.0
}

impl Default for CategorizationConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

/// Serde helpers for human-readable durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    fn parse<E: serde::de::Error>(raw: Raw) -> Result<Duration, E> {
        match raw {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(E::custom),
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<Raw>::deserialize(deserializer)?
                .map(parse)
                .transpose()
        }
    }
}
