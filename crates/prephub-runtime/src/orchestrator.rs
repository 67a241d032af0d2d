//! Fallback orchestrator.
//!
//! Wraps the provider pool with the response cache and, when configured,
//! the resilience guard. One logical request becomes:
//!
//! 1. a cache lookup (unless the policy asks for a refresh)
//! 2. a strictly sequential walk over the pool, one backend at a time
//! 3. extraction of a usable payload from each raw response
//! 4. on the first usable payload, a best-effort cache write and return
//!
//! Every per-backend failure is recorded and the walk moves on. Only when
//! the pool is exhausted (or the overall deadline passes) does the caller
//! see [`OrchestratorError::AllProvidersFailed`].

use prephub_core::ResponseExtractor;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::pool::{Backend, BackendId, ProviderPool};
use crate::providers::{ProviderError, ProviderKind, ResponseShape};
use crate::resilience::{GuardError, ResilienceGuard};

/// Why one backend attempt produced nothing usable.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("circuit open")]
    CircuitOpen,

    #[error("guard timeout after {0:?}")]
    Timeout(Duration),

    #[error("empty response")]
    EmptyOutput,

    #[error("no JSON payload in response")]
    Unparseable,

    #[error("payload rejected by shape check")]
    Rejected,

    #[error("overall deadline reached")]
    DeadlineExceeded,
}

impl From<GuardError<ProviderError>> for AttemptError {
    fn from(err: GuardError<ProviderError>) -> Self {
        match err {
            GuardError::RateLimited {
                retry_after_secs, ..
            } => AttemptError::RateLimited { retry_after_secs },
            GuardError::CircuitOpen { .. } => AttemptError::CircuitOpen,
            GuardError::Timeout { after, .. } => AttemptError::Timeout(after),
            GuardError::Inner(e) => AttemptError::Provider(e),
        }
    }
}

/// One failed attempt in a walk.
#[derive(Debug)]
pub struct AttemptFailure {
    pub backend: BackendId,
    pub error: AttemptError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

/// Errors surfaced to orchestrator callers.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{}", describe_failure(.attempts, .deadline_exceeded))]
    AllProvidersFailed {
        attempts: Vec<AttemptFailure>,
        deadline_exceeded: bool,
    },
}

fn describe_failure(attempts: &[AttemptFailure], deadline_exceeded: &bool) -> String {
    let mut message = format!("all AI providers failed ({} attempt(s)", attempts.len());
    if *deadline_exceeded {
        message.push_str(", deadline exceeded");
    }
    message.push(')');
    if !attempts.is_empty() {
        let parts: Vec<String> = attempts.iter().map(|a| a.to_string()).collect();
        message.push_str(": ");
        message.push_str(&parts.join("; "));
    }
    message
}

/// How a request uses the cache.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub key: String,
    pub ttl: Duration,
    /// Skip the lookup but still store the fresh result
    pub refresh: bool,
}

impl CachePolicy {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            refresh: false,
        }
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationSource {
    Cache,
    Backend { id: BackendId },
}

/// A successful generation.
#[derive(Debug, Clone)]
pub struct Generation<T> {
    pub value: T,
    pub source: GenerationSource,
}

/// Sequential fallback across the provider pool.
pub struct FallbackOrchestrator {
    pool: ProviderPool,
    cache: Arc<ResponseCache>,
    guard: Option<Arc<ResilienceGuard>>,
    overall_deadline: Option<Duration>,
}

impl FallbackOrchestrator {
    pub fn new(pool: ProviderPool, cache: Arc<ResponseCache>) -> Self {
        Self {
            pool,
            cache,
            guard: None,
            overall_deadline: None,
        }
    }

    /// Route backend calls through `guard`.
    pub fn with_guard(mut self, guard: Arc<ResilienceGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Bound each complete walk.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.overall_deadline = deadline;
        self
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn guard(&self) -> Option<&ResilienceGuard> {
        self.guard.as_deref()
    }

    /// Generate free text.
    ///
    /// Whitespace-only output counts as a failure.
    pub async fn generate_text(
        &self,
        prompt: &str,
        policy: Option<&CachePolicy>,
    ) -> Result<Generation<String>, OrchestratorError> {
        let generation = self
            .walk(
                prompt,
                ResponseShape::Text,
                policy,
                |raw| {
                    let text = ResponseExtractor::extract_plain_text(raw);
                    if text.is_empty() {
                        Err(AttemptError::EmptyOutput)
                    } else {
                        Ok(Value::String(text))
                    }
                },
                |cached| cached.as_str().is_some_and(|s| !s.trim().is_empty()),
            )
            .await?;

        let value = match generation.value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(Generation {
            value,
            source: generation.source,
        })
    }

    /// Generate a JSON payload.
    pub async fn generate_json(
        &self,
        prompt: &str,
        policy: Option<&CachePolicy>,
    ) -> Result<Generation<Value>, OrchestratorError> {
        self.generate_json_gated(prompt, policy, |_| true).await
    }

    /// Generate a JSON payload that `gate` accepts.
    ///
    /// A rejected payload moves the walk to the next backend. Cached values
    /// are held to the same gate.
    pub async fn generate_json_gated<G>(
        &self,
        prompt: &str,
        policy: Option<&CachePolicy>,
        gate: G,
    ) -> Result<Generation<Value>, OrchestratorError>
    where
        G: Fn(&Value) -> bool,
    {
        self.walk(
            prompt,
            ResponseShape::Json,
            policy,
            |raw| {
                let value = ResponseExtractor::extract_structured(raw).ok_or_else(|| {
                    if raw.trim().is_empty() {
                        AttemptError::EmptyOutput
                    } else {
                        AttemptError::Unparseable
                    }
                })?;
                if gate(&value) {
                    Ok(value)
                } else {
                    Err(AttemptError::Rejected)
                }
            },
            |cached| !cached.is_null() && gate(cached),
        )
        .await
    }

    async fn walk<A, C>(
        &self,
        prompt: &str,
        shape: ResponseShape,
        policy: Option<&CachePolicy>,
        accept: A,
        cached_ok: C,
    ) -> Result<Generation<Value>, OrchestratorError>
    where
        A: Fn(&str) -> Result<Value, AttemptError>,
        C: Fn(&Value) -> bool,
    {
        if let Some(policy) = policy.filter(|p| !p.refresh) {
            if let Some(value) = self.cache.get(&policy.key).await {
                if cached_ok(&value) {
                    return Ok(Generation {
                        value,
                        source: GenerationSource::Cache,
                    });
                }
                tracing::debug!(key = %policy.key, "Ignoring unusable cached value");
            }
        }

        let deadline = self.overall_deadline.map(|d| Instant::now() + d);
        let mut attempts = Vec::new();
        let mut deadline_exceeded = false;

        for backend in self.pool.backends() {
            tracing::debug!(backend = %backend.id, "Attempting backend");

            let raw = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        deadline_exceeded = true;
                        break;
                    }
                    match tokio::time::timeout(at - now, self.attempt(backend, prompt, shape)).await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            attempts.push(AttemptFailure {
                                backend: backend.id,
                                error: AttemptError::DeadlineExceeded,
                            });
                            deadline_exceeded = true;
                            break;
                        }
                    }
                }
                None => self.attempt(backend, prompt, shape).await,
            };

            match raw.and_then(|text| accept(&text)) {
                Ok(value) => {
                    if let Some(policy) = policy {
                        self.cache.set(&policy.key, value.clone(), policy.ttl).await;
                    }
                    tracing::info!(backend = %backend.id, failed_before = attempts.len(), "Generation succeeded");
                    return Ok(Generation {
                        value,
                        source: GenerationSource::Backend { id: backend.id },
                    });
                }
                Err(error) => {
                    tracing::warn!(backend = %backend.id, error = %error, "Backend attempt failed");
                    attempts.push(AttemptFailure {
                        backend: backend.id,
                        error,
                    });
                }
            }
        }

        tracing::warn!(
            attempts = attempts.len(),
            deadline_exceeded,
            "All AI providers failed"
        );
        Err(OrchestratorError::AllProvidersFailed {
            attempts,
            deadline_exceeded,
        })
    }

    async fn attempt(
        &self,
        backend: &Backend,
        prompt: &str,
        shape: ResponseShape,
    ) -> Result<String, AttemptError> {
        match &self.guard {
            Some(guard) => guard
                .call(backend.kind(), || self.pool.invoke(backend, prompt, shape))
                .await
                .map_err(AttemptError::from),
            None => self
                .pool
                .invoke(backend, prompt, shape)
                .await
                .map_err(AttemptError::from),
        }
    }

    /// Kinds present in the pool, in walk order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = Vec::new();
        for backend in self.pool.backends() {
            if !kinds.contains(&backend.kind()) {
                kinds.push(backend.kind());
            }
        }
        kinds
    }
}

impl fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("pool", &self.pool)
            .field("guarded", &self.guard.is_some())
            .field("overall_deadline", &self.overall_deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, RateLimitConfig};
    use crate::testing::{backend, call_log, pool_of, BrokenStore, Reply, ScriptedProvider};
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    fn orchestrator(providers: &[Arc<ScriptedProvider>]) -> FallbackOrchestrator {
        FallbackOrchestrator::new(pool_of(providers), Arc::new(ResponseCache::default()))
    }

    #[tokio::test]
    async fn test_walks_in_order_until_success() {
        let log = call_log();
        let a = Arc::new(ScriptedProvider::failing("503").named("a").with_log(&log));
        let b = Arc::new(ScriptedProvider::failing("quota").named("b").with_log(&log));
        let c = Arc::new(ScriptedProvider::always("Closures capture scope.").named("c").with_log(&log));
        let orch = orchestrator(&[a.clone(), b.clone(), c.clone()]);

        let generation = orch.generate_text("explain closures", None).await.unwrap();

        assert_eq!(generation.value, "Closures capture scope.");
        assert_eq!(
            generation.source,
            GenerationSource::Backend {
                id: BackendId {
                    kind: ProviderKind::Groq,
                    index: 3
                }
            }
        );
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_all_fail_is_terminal() {
        let providers: Vec<_> = (0..3)
            .map(|i| Arc::new(ScriptedProvider::failing(format!("down {}", i))))
            .collect();
        let orch = orchestrator(&providers);

        let err = orch.generate_text("p", None).await.unwrap_err();
        let OrchestratorError::AllProvidersFailed {
            attempts,
            deadline_exceeded,
        } = err;
        assert_eq!(attempts.len(), 3);
        assert!(!deadline_exceeded);
        assert!(attempts[2].to_string().contains("down 2"));
    }

    #[tokio::test]
    async fn test_empty_pool_fails_without_attempts() {
        let orch = orchestrator(&[]);
        let err = orch.generate_json("p", None).await.unwrap_err();
        assert!(err.to_string().starts_with("all AI providers failed (0 attempt(s))"));
    }

    #[tokio::test]
    async fn test_whitespace_output_is_a_failure() {
        let a = Arc::new(ScriptedProvider::always("   \n"));
        let b = Arc::new(ScriptedProvider::always("real answer"));
        let orch = orchestrator(&[a, b.clone()]);

        let generation = orch.generate_text("p", None).await.unwrap();
        assert_eq!(generation.value, "real answer");
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_json_moves_on() {
        let a = Arc::new(ScriptedProvider::always("not json at all"));
        let b = Arc::new(ScriptedProvider::always(
            "Here you go:\n```json\n{\"a\": 1}\n```\nEnjoy!",
        ));
        let orch = orchestrator(&[a, b]);

        let generation = orch.generate_json("p", None).await.unwrap();
        assert_eq!(generation.value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_gate_rejection_moves_on() {
        let a = Arc::new(ScriptedProvider::always(r#"{"group": "X", "confidence": 10}"#));
        let b = Arc::new(ScriptedProvider::always(r#"{"group": "Y", "confidence": 90}"#));
        let orch = orchestrator(&[a, b]);

        let generation = orch
            .generate_json_gated("p", None, |v| v["confidence"].as_f64().unwrap_or(0.0) >= 40.0)
            .await
            .unwrap();
        assert_eq!(generation.value["group"], "Y");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backends() {
        let a = Arc::new(ScriptedProvider::always("fresh"));
        let orch = orchestrator(&[a.clone()]);
        let policy = CachePolicy::new("answer:k", HOUR);
        orch.cache().set("answer:k", json!("cached"), HOUR).await;

        let generation = orch.generate_text("p", Some(&policy)).await.unwrap();
        assert_eq!(generation.value, "cached");
        assert_eq!(generation.source, GenerationSource::Cache);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_is_cached_for_next_call() {
        let a = Arc::new(ScriptedProvider::always("[1, 2]"));
        let orch = orchestrator(&[a.clone()]);
        let policy = CachePolicy::new("quiz:k", HOUR);

        let first = orch.generate_json("p", Some(&policy)).await.unwrap();
        let second = orch.generate_json("p", Some(&policy)).await.unwrap();

        assert!(matches!(first.source, GenerationSource::Backend { .. }));
        assert_eq!(second.source, GenerationSource::Cache);
        assert_eq!(second.value, json!([1, 2]));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_skips_read_but_writes() {
        let a = Arc::new(ScriptedProvider::script(vec![
            Reply::Text("[\"new\"]".to_string()),
        ]));
        let orch = orchestrator(&[a.clone()]);
        orch.cache().set("quiz:k", json!(["old"]), HOUR).await;

        let policy = CachePolicy::new("quiz:k", HOUR).refresh(true);
        let generation = orch.generate_json("p", Some(&policy)).await.unwrap();

        assert_eq!(generation.value, json!(["new"]));
        assert_eq!(orch.cache().get("quiz:k").await, Some(json!(["new"])));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_value_failing_gate_is_ignored() {
        let a = Arc::new(ScriptedProvider::always(r#"{"ok": true}"#));
        let orch = orchestrator(&[a.clone()]);
        orch.cache().set("k", json!({"ok": false}), HOUR).await;

        let policy = CachePolicy::new("k", HOUR);
        let generation = orch
            .generate_json_gated("p", Some(&policy), |v| v["ok"] == json!(true))
            .await
            .unwrap();
        assert_eq!(generation.value, json!({"ok": true}));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_the_walk() {
        let a = Arc::new(ScriptedProvider::always("slow").with_delay(Duration::from_secs(20)));
        let b = Arc::new(ScriptedProvider::always("fast"));
        let orch = orchestrator(&[a, b.clone()]).with_deadline(Some(Duration::from_secs(5)));

        let err = orch.generate_text("p", None).await.unwrap_err();
        let OrchestratorError::AllProvidersFailed {
            attempts,
            deadline_exceeded,
        } = err;
        assert!(deadline_exceeded);
        assert!(matches!(attempts[0].error, AttemptError::DeadlineExceeded));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_rejection_is_recorded_and_skipped() {
        let a = Arc::new(ScriptedProvider::failing("boom"));
        let b = Arc::new(ScriptedProvider::always("unreachable"));
        let guard = ResilienceGuard::new(CircuitBreakerConfig::default()).with_rate_limit(
            ProviderKind::Groq,
            RateLimitConfig::new(1, Duration::from_secs(60)),
        );
        let orch = orchestrator(&[a, b.clone()]).with_guard(Arc::new(guard));

        let err = orch.generate_text("p", None).await.unwrap_err();
        let OrchestratorError::AllProvidersFailed { attempts, .. } = err;
        assert!(matches!(attempts[0].error, AttemptError::Provider(_)));
        assert!(matches!(
            attempts[1].error,
            AttemptError::RateLimited {
                retry_after_secs: 60
            }
        ));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_kind_without_calling() {
        let groq = Arc::new(ScriptedProvider::failing("503"));
        let gemini = Arc::new(ScriptedProvider::script(vec![
            Reply::Text("first".into()),
            Reply::Fail("quota".into()),
        ]));
        let pool = ProviderPool::new(vec![
            backend(ProviderKind::Groq, 1, groq.clone()),
            backend(ProviderKind::Gemini, 1, gemini.clone()),
        ]);
        let guard = ResilienceGuard::new(CircuitBreakerConfig {
            volume_threshold: 1,
            ..Default::default()
        });
        let orch = FallbackOrchestrator::new(pool, Arc::new(ResponseCache::default()))
            .with_guard(Arc::new(guard));

        let first = orch.generate_text("p", None).await.unwrap();
        assert_eq!(first.value, "first");

        let err = orch.generate_text("p", None).await.unwrap_err();
        let OrchestratorError::AllProvidersFailed { attempts, .. } = err;
        assert_eq!(attempts[0].backend.kind, ProviderKind::Groq);
        assert!(matches!(attempts[0].error, AttemptError::CircuitOpen));
        assert!(matches!(attempts[1].error, AttemptError::Provider(_)));
        assert_eq!(groq.calls(), 1);
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test]
    async fn test_durable_write_failure_keeps_result() {
        let provider = Arc::new(ScriptedProvider::always("Hoisting moves declarations."));
        let cache = ResponseCache::default().with_store(Arc::new(BrokenStore));
        let orch = FallbackOrchestrator::new(pool_of(&[provider.clone()]), Arc::new(cache));
        let policy = CachePolicy::new("explanation:js:hoisting", HOUR);

        let generated = orch.generate_text("p", Some(&policy)).await.unwrap();
        assert_eq!(generated.value, "Hoisting moves declarations.");
        assert!(matches!(generated.source, GenerationSource::Backend { .. }));

        let again = orch.generate_text("p", Some(&policy)).await.unwrap();
        assert_eq!(again.source, GenerationSource::Cache);
        assert_eq!(provider.calls(), 1);
    }
}
