//! Circuit breaker to stop hammering a failing provider kind.
//!
//! Outcomes are counted in a rolling window split into buckets. Once the
//! window holds enough calls and the failure share reaches the threshold,
//! the circuit opens and calls are rejected without reaching the provider.
//! After the reset timeout a single trial call is let through: success
//! closes the circuit, failure re-opens it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::providers::ProviderKind;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (1-100) that opens the circuit
    pub error_threshold_percentage: u32,

    /// Length of the rolling statistics window
    #[serde(with = "crate::config::duration_str")]
    pub rolling_window: Duration,

    /// Number of buckets the window is split into
    pub rolling_buckets: u32,

    /// Minimum calls in the window before the circuit may open
    pub volume_threshold: u32,

    /// Time spent open before a trial call is admitted
    #[serde(with = "crate::config::duration_str")]
    pub reset_timeout: Duration,

    /// Hard timeout for a guarded call
    #[serde(with = "crate::config::duration_str")]
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50,
            rolling_window: Duration::from_secs(10),
            rolling_buckets: 10,
            volume_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    fn bucket_width(&self) -> Duration {
        (self.rolling_window / self.rolling_buckets.max(1)).max(Duration::from_millis(1))
    }
}

/// Externally visible state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Calls are rejected
    Open,
    /// Waiting on a trial call
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { trial_started: Option<Instant> },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: Instant,
    successes: u32,
    failures: u32,
}

/// Cumulative counters plus the current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub successes: u64,
    pub failures: u64,
    pub rejects: u64,
    pub timeouts: u64,
    /// Calls currently inside the rolling window
    pub window_calls: u32,
    /// Failures currently inside the rolling window
    pub window_failures: u32,
}

/// Returned by [`CircuitBreaker::try_acquire`] while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen;

#[derive(Debug)]
struct Circuit {
    phase: Phase,
    buckets: VecDeque<Bucket>,
    successes: u64,
    failures: u64,
    rejects: u64,
    timeouts: u64,
}

impl Circuit {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            buckets: VecDeque::new(),
            successes: 0,
            failures: 0,
            rejects: 0,
            timeouts: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.start) >= window {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn bucket(&mut self, now: Instant, width: Duration) -> &mut Bucket {
        let needs_new = self
            .buckets
            .back()
            .map_or(true, |b| now.duration_since(b.start) >= width);
        if needs_new {
            self.buckets.push_back(Bucket {
                start: now,
                successes: 0,
                failures: 0,
            });
        }
        // A bucket was pushed above if none existed.
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn window_totals(&self) -> (u32, u32) {
        self.buckets.iter().fold((0, 0), |(calls, failures), b| {
            (calls + b.successes + b.failures, failures + b.failures)
        })
    }
}

/// Per-kind circuit breaker.
///
/// Each provider kind has its own circuit to allow independent recovery.
pub struct CircuitBreaker {
    circuits: RwLock<HashMap<ProviderKind, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to place a call for `kind`.
    ///
    /// Moves an open circuit to half-open once the reset timeout has passed
    /// and admits exactly one trial call while half-open. A trial that never
    /// reports back is abandoned after the call timeout.
    pub fn try_acquire(&self, kind: ProviderKind) -> Result<(), CircuitOpen> {
        let now = Instant::now();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(kind).or_insert_with(Circuit::new);

        match circuit.phase {
            Phase::Closed => Ok(()),
            Phase::Open { opened_at } => {
                if now.duration_since(opened_at) >= self.config.reset_timeout {
                    circuit.phase = Phase::HalfOpen {
                        trial_started: Some(now),
                    };
                    tracing::info!(provider = %kind, "Circuit half-open, admitting trial call");
                    Ok(())
                } else {
                    circuit.rejects += 1;
                    Err(CircuitOpen)
                }
            }
            Phase::HalfOpen { trial_started } => {
                let trial_busy = trial_started
                    .is_some_and(|started| now.duration_since(started) < self.config.call_timeout);
                if trial_busy {
                    circuit.rejects += 1;
                    Err(CircuitOpen)
                } else {
                    circuit.phase = Phase::HalfOpen {
                        trial_started: Some(now),
                    };
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, kind: ProviderKind) {
        let now = Instant::now();
        let width = self.config.bucket_width();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(kind).or_insert_with(Circuit::new);
        circuit.successes += 1;

        match circuit.phase {
            Phase::HalfOpen { .. } => {
                circuit.phase = Phase::Closed;
                circuit.buckets.clear();
                tracing::info!(provider = %kind, "Circuit closed after successful trial call");
            }
            Phase::Closed => {
                circuit.prune(now, self.config.rolling_window);
                circuit.bucket(now, width).successes += 1;
            }
            Phase::Open { .. } => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, kind: ProviderKind) {
        self.record_failed(kind, false);
    }

    /// Record a call that hit the guard's timeout. Counts as a failure.
    pub fn record_timeout(&self, kind: ProviderKind) {
        self.record_failed(kind, true);
    }

    fn record_failed(&self, kind: ProviderKind, timed_out: bool) {
        let now = Instant::now();
        let width = self.config.bucket_width();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(kind).or_insert_with(Circuit::new);
        circuit.failures += 1;
        if timed_out {
            circuit.timeouts += 1;
        }

        match circuit.phase {
            Phase::HalfOpen { .. } => {
                circuit.phase = Phase::Open { opened_at: now };
                tracing::warn!(provider = %kind, "Circuit reopened after failed trial call");
            }
            Phase::Closed => {
                circuit.prune(now, self.config.rolling_window);
                circuit.bucket(now, width).failures += 1;

                let (calls, failures) = circuit.window_totals();
                let tripped = calls >= self.config.volume_threshold
                    && u64::from(failures) * 100
                        >= u64::from(self.config.error_threshold_percentage) * u64::from(calls);
                if tripped {
                    circuit.phase = Phase::Open { opened_at: now };
                    tracing::error!(
                        provider = %kind,
                        window_calls = calls,
                        window_failures = failures,
                        "Circuit opened"
                    );
                }
            }
            Phase::Open { .. } => {}
        }
    }

    /// Get current state of a circuit.
    pub fn state(&self, kind: ProviderKind) -> CircuitState {
        self.circuits
            .read()
            .get(&kind)
            .map_or(CircuitState::Closed, |c| c.phase.state())
    }

    /// Counters and state for a circuit.
    pub fn stats(&self, kind: ProviderKind) -> CircuitStats {
        let now = Instant::now();
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(kind).or_insert_with(Circuit::new);
        circuit.prune(now, self.config.rolling_window);
        let (window_calls, window_failures) = circuit.window_totals();
        CircuitStats {
            state: circuit.phase.state(),
            successes: circuit.successes,
            failures: circuit.failures,
            rejects: circuit.rejects,
            timeouts: circuit.timeouts,
            window_calls,
            window_failures,
        }
    }

    /// Force one circuit back to closed with an empty window.
    pub fn reset(&self, kind: ProviderKind) {
        if let Some(circuit) = self.circuits.write().get_mut(&kind) {
            circuit.phase = Phase::Closed;
            circuit.buckets.clear();
            tracing::info!(provider = %kind, "Circuit manually reset");
        }
    }

    /// Reset all circuits to closed.
    pub fn reset_all(&self) {
        self.circuits.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .finish()
    }
}
