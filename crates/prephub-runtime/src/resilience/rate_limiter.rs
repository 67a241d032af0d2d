//! Fixed-window rate limiting per provider kind.
//!
//! Every kind owns a bucket of `points` per `duration`. A call consumes one
//! point; once the bucket is empty, calls are rejected until the window
//! rolls over, or until `block_duration` has passed when one is configured.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::providers::ProviderKind;

const DEFAULT_BLOCK: Duration = Duration::from_secs(60);

/// Rate limit for one provider kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls allowed per window
    pub points: u32,

    /// Window length
    #[serde(with = "crate::config::duration_str")]
    pub duration: Duration,

    /// Penalty applied once the bucket is exhausted
    #[serde(default, with = "crate::config::duration_str::option")]
    pub block_duration: Option<Duration>,
}

impl RateLimitConfig {
    pub fn new(points: u32, duration: Duration) -> Self {
        Self {
            points,
            duration,
            block_duration: None,
        }
    }

    /// Built-in limit for a kind, sized to the free tiers. An exhausted
    /// bucket blocks the kind for a full minute.
    pub fn default_for(kind: ProviderKind) -> Self {
        let points = match kind {
            ProviderKind::Groq => 30,
            ProviderKind::Gemini => 15,
            ProviderKind::HuggingFace => 10,
        };
        Self {
            block_duration: Some(DEFAULT_BLOCK),
            ..Self::new(points, Duration::from_secs(60))
        }
    }
}

/// Returned when a bucket has no points left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Whole seconds to wait, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Snapshot of a kind's bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub points: u32,
    #[serde(with = "crate::config::duration_str")]
    pub duration: Duration,
    pub remaining: u32,
    pub blocked: bool,
    #[serde(with = "crate::config::duration_str::option")]
    pub block_duration: Option<Duration>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    consumed: u32,
    blocked_until: Option<Instant>,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self {
            started: now,
            consumed: 0,
            blocked_until: None,
        }
    }

    fn roll(&mut self, now: Instant, duration: Duration) {
        if now.duration_since(self.started) >= duration {
            self.started = now;
            self.consumed = 0;
        }
        if self.blocked_until.is_some_and(|until| now >= until) {
            self.blocked_until = None;
            self.started = now;
            self.consumed = 0;
        }
    }
}

/// Per-kind fixed-window limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limits: HashMap<ProviderKind, RateLimitConfig>,
    windows: Mutex<HashMap<ProviderKind, Window>>,
}

impl RateLimiter {
    /// Limiter using the built-in per-kind defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the limit for one kind.
    pub fn with_limit(mut self, kind: ProviderKind, limit: RateLimitConfig) -> Self {
        self.limits.insert(kind, limit);
        self
    }

    pub fn limit_for(&self, kind: ProviderKind) -> RateLimitConfig {
        self.limits
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| RateLimitConfig::default_for(kind))
    }

    /// Consume one point for `kind`.
    pub fn consume(&self, kind: ProviderKind) -> Result<(), RateLimitExceeded> {
        let limit = self.limit_for(kind);
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(kind).or_insert_with(|| Window::fresh(now));
        window.roll(now, limit.duration);

        if let Some(until) = window.blocked_until {
            return Err(RateLimitExceeded {
                retry_after: until.duration_since(now),
            });
        }

        if window.consumed < limit.points {
            window.consumed += 1;
            return Ok(());
        }

        let retry_after = match limit.block_duration {
            Some(block) => {
                window.blocked_until = Some(now + block);
                block
            }
            None => (window.started + limit.duration).duration_since(now),
        };
        tracing::warn!(
            provider = %kind,
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit exhausted"
        );
        Err(RateLimitExceeded { retry_after })
    }

    /// Current bucket state for `kind`.
    pub fn stats(&self, kind: ProviderKind) -> RateLimitStats {
        let limit = self.limit_for(kind);
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let (remaining, blocked) = match windows.get_mut(&kind) {
            Some(window) => {
                window.roll(now, limit.duration);
                (
                    limit.points.saturating_sub(window.consumed),
                    window.blocked_until.is_some(),
                )
            }
            None => (limit.points, false),
        };
        RateLimitStats {
            points: limit.points,
            duration: limit.duration,
            remaining,
            blocked,
            block_duration: limit.block_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limiter(points: u32) -> RateLimiter {
        RateLimiter::new().with_limit(
            ProviderKind::Gemini,
            RateLimitConfig::new(points, Duration::from_secs(60)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_n_calls_accepted() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.consume(ProviderKind::Gemini).is_ok());
        }

        let err = limiter.consume(ProviderKind::Gemini).unwrap_err();
        assert_eq!(err.retry_after_secs(), 60);
        assert_eq!(limiter.stats(ProviderKind::Gemini).remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_restores_points() {
        let limiter = limiter(1);
        assert!(limiter.consume(ProviderKind::Gemini).is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        let err = limiter.consume(ProviderKind::Gemini).unwrap_err();
        assert_eq!(err.retry_after_secs(), 30);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.consume(ProviderKind::Gemini).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_duration_outlasts_window() {
        let limiter = RateLimiter::new().with_limit(
            ProviderKind::Groq,
            RateLimitConfig {
                points: 1,
                duration: Duration::from_secs(10),
                block_duration: Some(Duration::from_secs(120)),
            },
        );
        assert!(limiter.consume(ProviderKind::Groq).is_ok());
        assert!(limiter.consume(ProviderKind::Groq).is_err());
        assert!(limiter.stats(ProviderKind::Groq).blocked);

        tokio::time::advance(Duration::from_secs(60)).await;
        let err = limiter.consume(ProviderKind::Groq).unwrap_err();
        assert_eq!(err.retry_after_secs(), 60);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.consume(ProviderKind::Groq).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_limit_blocks_for_a_minute() {
        let limiter = RateLimiter::new();
        let stats = limiter.stats(ProviderKind::HuggingFace);
        assert_eq!(stats.points, 10);
        assert_eq!(stats.block_duration, Some(Duration::from_secs(60)));

        for _ in 0..10 {
            assert!(limiter.consume(ProviderKind::HuggingFace).is_ok());
        }
        tokio::time::advance(Duration::from_secs(50)).await;
        let err = limiter.consume(ProviderKind::HuggingFace).unwrap_err();
        assert_eq!(err.retry_after_secs(), 60);
        assert!(limiter.stats(ProviderKind::HuggingFace).blocked);

        // The window would have rolled by now; the block still holds.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            limiter.consume(ProviderKind::HuggingFace).unwrap_err().retry_after_secs(),
            30
        );

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.consume(ProviderKind::HuggingFace).is_ok());
        assert!(!limiter.stats(ProviderKind::HuggingFace).blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.consume(ProviderKind::Gemini).is_ok());
        assert!(limiter.consume(ProviderKind::Gemini).is_err());
        assert!(limiter.consume(ProviderKind::Groq).is_ok());
        assert_eq!(limiter.stats(ProviderKind::Groq).remaining, 29);
    }

    proptest! {
        #[test]
        fn prop_accepts_at_most_points_per_window(points in 1u32..50, calls in 0u32..120) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let limiter = limiter(points);
                let accepted = (0..calls)
                    .filter(|_| limiter.consume(ProviderKind::Gemini).is_ok())
                    .count() as u32;
                prop_assert_eq!(accepted, calls.min(points));
                Ok(())
            })?;
        }
    }
}
