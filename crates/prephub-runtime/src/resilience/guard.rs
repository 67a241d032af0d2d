//! Rate limiter and circuit breaker composed around one backend call.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::{
    CircuitBreaker, CircuitBreakerConfig, CircuitStats, RateLimitConfig, RateLimitStats,
    RateLimiter,
};
use crate::config::GuardConfig;
use crate::providers::ProviderKind;

/// Why a guarded call did not produce a value.
#[derive(Error, Debug)]
pub enum GuardError<E> {
    #[error("{kind} rate limit reached, retry after {retry_after_secs}s")]
    RateLimited {
        kind: ProviderKind,
        retry_after_secs: u64,
    },

    #[error("{kind} circuit is open")]
    CircuitOpen { kind: ProviderKind },

    #[error("{kind} call timed out after {after:?}")]
    Timeout { kind: ProviderKind, after: Duration },

    #[error(transparent)]
    Inner(E),
}

impl<E> GuardError<E> {
    /// True when the guard refused the call without running it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GuardError::RateLimited { .. } | GuardError::CircuitOpen { .. }
        )
    }
}

/// Per-kind rate limiting and circuit breaking.
///
/// Kinds not listed as enabled pass straight through.
#[derive(Debug)]
pub struct ResilienceGuard {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    enabled: HashSet<ProviderKind>,
}

impl ResilienceGuard {
    /// Guard every kind with default limits.
    pub fn new(breaker: CircuitBreakerConfig) -> Self {
        Self {
            limiter: RateLimiter::new(),
            breaker: CircuitBreaker::new(breaker),
            enabled: ProviderKind::ALL.into_iter().collect(),
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        let limiter = ProviderKind::ALL
            .into_iter()
            .fold(RateLimiter::new(), |limiter, kind| {
                limiter.with_limit(kind, config.rate_limit(kind))
            });
        Self {
            limiter,
            breaker: CircuitBreaker::new(config.breaker.clone()),
            enabled: config.enabled.iter().copied().collect(),
        }
    }

    /// Replace the rate limit for one kind.
    pub fn with_rate_limit(mut self, kind: ProviderKind, limit: RateLimitConfig) -> Self {
        self.limiter = self.limiter.with_limit(kind, limit);
        self
    }

    /// Restrict the guard to the given kinds.
    pub fn only(mut self, kinds: impl IntoIterator<Item = ProviderKind>) -> Self {
        self.enabled = kinds.into_iter().collect();
        self
    }

    pub fn applies_to(&self, kind: ProviderKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Run `call` under the guard for `kind`.
    ///
    /// Consumes a rate-limit point, checks the circuit, then runs the call
    /// with the breaker's hard timeout and records the outcome. Rejected
    /// calls never run `call`.
    pub async fn call<T, E, F, Fut>(&self, kind: ProviderKind, call: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.applies_to(kind) {
            return call().await.map_err(GuardError::Inner);
        }

        if let Err(limited) = self.limiter.consume(kind) {
            tracing::warn!(
                provider = %kind,
                retry_after_secs = limited.retry_after_secs(),
                "Call rejected by rate limiter"
            );
            return Err(GuardError::RateLimited {
                kind,
                retry_after_secs: limited.retry_after_secs(),
            });
        }

        if self.breaker.try_acquire(kind).is_err() {
            tracing::warn!(provider = %kind, "Call rejected by open circuit");
            return Err(GuardError::CircuitOpen { kind });
        }

        let timeout = self.breaker.config().call_timeout;
        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => {
                self.breaker.record_success(kind);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(kind);
                Err(GuardError::Inner(e))
            }
            Err(_) => {
                self.breaker.record_timeout(kind);
                Err(GuardError::Timeout {
                    kind,
                    after: timeout,
                })
            }
        }
    }

    pub fn circuit_stats(&self, kind: ProviderKind) -> CircuitStats {
        self.breaker.stats(kind)
    }

    pub fn rate_limit_stats(&self, kind: ProviderKind) -> RateLimitStats {
        self.limiter.stats(kind)
    }

    /// Manually close a kind's circuit.
    pub fn reset_circuit(&self, kind: ProviderKind) {
        self.breaker.reset(kind);
    }
}

impl Default for ResilienceGuard {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
