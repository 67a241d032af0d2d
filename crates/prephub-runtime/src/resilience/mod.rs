//! Resilience patterns for prephub-runtime.
//!
//! This module provides:
//! - Fixed-window rate limiting per provider kind
//! - Circuit breaker over a rolling failure window
//! - The guard composing both around a single call

mod circuit_breaker;
mod guard;
mod rate_limiter;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState, CircuitStats,
};
pub use guard::{GuardError, ResilienceGuard};
pub use rate_limiter::{RateLimitConfig, RateLimitExceeded, RateLimitStats, RateLimiter};
