//! Circuit breaker state machine and per-node registry.
//!
//! The breaker halts calls to a failing dependency during a cool-down.
//! Failure records live in a sliding window; the window is pruned on
//! every failure and is deliberately *not* cleared when the circuit
//! opens, so a failure observed shortly after entering half-open
//! typically reopens the circuit straight away.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::node::{FailureKind, NodeError};

/// The three circuit states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures accumulate in the window.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// Probing: calls pass through while consecutive successes are
    /// counted toward closing.
    HalfOpen,
}

/// Tunables for a [`CircuitBreaker`].
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Windowed failure count that trips the circuit.
    pub failure_threshold: usize,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
    /// Cool-down before an open circuit lets a probe through.
    pub reset_timeout: Duration,
    /// Sliding window for failure records.
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    failures: Vec<Instant>,
    consecutive_successes: u32,
    open_until: Option<Instant>,
}

/// Protective state machine gating calls to one node identity.
///
/// Shared across attempts and runs via `Arc`; internal state is guarded
/// by a `parking_lot::Mutex`, so one breaker may be touched by several
/// concurrently executing nodes.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: Vec::new(),
                consecutive_successes: 0,
                open_until: None,
            }),
        }
    }

    /// The node identity this breaker protects.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Purely observational; the open→half-open
    /// transition happens only inside [`execute`](Self::execute).
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Number of failure records currently inside the window.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.inner.lock().failures.len()
    }

    /// Gate `operation` through the circuit.
    ///
    /// An open circuit whose reset timeout has not elapsed rejects
    /// immediately with a [`FailureKind::CircuitOpen`] error, without
    /// running the operation. Once the timeout elapses the circuit moves
    /// to half-open and the operation runs as a probe.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        if let Some(rejection) = self.check_gate() {
            return Err(rejection);
        }
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure();
                Err(error)
            }
        }
    }

    fn check_gate(&self) -> Option<NodeError> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let reopen_at = inner.open_until.unwrap_or_else(Instant::now);
        if Instant::now() < reopen_at {
            return Some(NodeError::new(
                FailureKind::CircuitOpen,
                self.name.clone(),
                "circuit open; call rejected without running node logic",
            ));
        }
        tracing::debug!(breaker = %self.name, "reset timeout elapsed; probing half-open");
        inner.state = CircuitState::HalfOpen;
        inner.consecutive_successes = 0;
        None
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    tracing::info!(breaker = %self.name, "circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.consecutive_successes = 0;
                    inner.open_until = None;
                }
            }
            CircuitState::Closed => inner.failures.clear(),
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.failures.push(now);
        let window = self.config.failure_window;
        inner.failures.retain(|t| now.duration_since(*t) <= window);

        let tripped = matches!(inner.state, CircuitState::Closed | CircuitState::HalfOpen)
            && inner.failures.len() >= self.config.failure_threshold;
        if tripped {
            // The window is kept across the transition: records from
            // before opening still count, so a half-open failure usually
            // re-trips the threshold immediately.
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failures.len(),
                "circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.open_until = Some(now + self.config.reset_timeout);
            inner.consecutive_successes = 0;
        }
    }
}

/// Lazily creates and caches one shared breaker per node identity.
///
/// An explicitly constructed service owned by the application's
/// top-level context and injected where needed; never a global.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<FxHashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// A registry handing out breakers built from `config`.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(FxHashMap::default()),
        }
    }

    /// The breaker for a node identity, created on first use.
    #[must_use]
    pub fn breaker_for(&self, node_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(node_id.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(node_id, self.config.clone()))
        }))
    }

    /// The breaker for a node identity, if one was ever created.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(node_id).cloned()
    }

    /// Number of breakers created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_caches_one_breaker_per_identity() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.breaker_for("fetch");
        let again = registry.breaker_for("fetch");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("other").is_none());
    }
}
