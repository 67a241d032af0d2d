//! Provider API keys.
//!
//! Keys only ever come from the environment. Each provider kind may have
//! several (`GROQ_API_KEY`, `GROQ_API_KEY_2`, ...), and every key becomes its
//! own backend in the pool. Values are held in a `secrecy` string and never
//! show up in Debug or Display output, so they can't leak through `tracing`.
//!
//! ```ignore
//! let keys = ApiCredential::all_from_env("GROQ_API_KEY", "Groq API key");
//! request.bearer_auth(keys[0].expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Highest numbered suffix scanned by [`ApiCredential::all_from_env`].
pub const MAX_KEYS_PER_PROVIDER: usize = 9;

/// Origin of a key, shown in logs instead of the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    /// Handed in by code, e.g. tests
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// One provider API key. Zeroed on drop; printed as `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read one variable. Blank values count as unset.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => {
                Ok(Self::new(v.trim(), CredentialSource::Environment, name))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "{} not set: configure '{}' environment variable",
                name, env_var
            ))),
        }
    }

    /// Load every numbered variant of `base_var`, in order.
    ///
    /// Reads `BASE`, then `BASE_2` through `BASE_9`, skipping unset or
    /// blank variables. An empty result is not an error: it simply means no
    /// backend of that kind is registered.
    pub fn all_from_env(base_var: &str, name: &'static str) -> Vec<Self> {
        std::iter::once(base_var.to_string())
            .chain((2..=MAX_KEYS_PER_PROVIDER).map(|i| format!("{}_{}", base_var, i)))
            .filter_map(|var| Self::from_env(&var, name).ok())
            .collect()
    }

    /// Raw key, for the request header only.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
