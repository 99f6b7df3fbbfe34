//! Per-node resilience: retry, circuit breaking, fallback, dead-letter
//! capture.
//!
//! Resilience is expressed as a wrapping value, not inheritance: a
//! [`ResilientNode`] holds an inner `Arc<dyn Node>` and a
//! [`ResilienceConfig`], and itself implements [`Node`]. The executor
//! never knows whether a registered node is wrapped.
//!
//! Composition order per attempt: the [`RetryPolicy`] is outermost; each
//! attempt is gated by the [`CircuitBreaker`] when one is configured (an
//! open breaker consumes the attempt without running node logic). When
//! every attempt is exhausted the fallback, dead-letter capture, and
//! suppress stages apply, in that order.

pub mod breaker;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use retry::{RetryObserver, RetryPolicy, RetryPredicate};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::dlq::DeadLetterQueue;
use crate::node::{ExecutionContext, FailureKind, Node, NodeError};
use crate::port::Port;
use crate::types::PortValueMap;

/// Alternative computation substituted for a failed primary computation.
///
/// Invoked with the terminal error and the invocation context; its
/// output map becomes the node's result.
pub type FallbackFn =
    Arc<dyn Fn(&NodeError, &ExecutionContext) -> Result<PortValueMap, NodeError> + Send + Sync>;

/// Optional per-node resilience configuration.
#[derive(Clone, Default)]
pub struct ResilienceConfig {
    retry: Option<RetryPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
    fallback: Option<FallbackFn>,
    dead_letter: Option<Arc<DeadLetterQueue>>,
    suppress_errors: bool,
}

impl ResilienceConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry failed attempts under the given policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Gate every attempt through a shared circuit breaker.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Substitute the fallback's output when every attempt failed.
    #[must_use]
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&NodeError, &ExecutionContext) -> Result<PortValueMap, NodeError>
            + Send
            + Sync
            + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Capture unrecoverable failures to the given dead letter queue.
    #[must_use]
    pub fn with_dead_letter(mut self, queue: Arc<DeadLetterQueue>) -> Self {
        self.dead_letter = Some(queue);
        self
    }

    /// Swallow unrecoverable failures, yielding an empty output map.
    #[must_use]
    pub fn suppress_errors(mut self) -> Self {
        self.suppress_errors = true;
        self
    }
}

impl fmt::Debug for ResilienceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceConfig")
            .field("retry", &self.retry)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .field("fallback", &self.fallback.as_ref().map(|_| "<fn>"))
            .field("dead_letter", &self.dead_letter.is_some())
            .field("suppress_errors", &self.suppress_errors)
            .finish()
    }
}

/// A [`Node`] wrapper composing retry, circuit breaking, fallback, and
/// dead-letter capture around an inner node's own logic.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dataloom::dlq::{DeadLetterConfig, DeadLetterQueue};
/// use dataloom::resilience::{ResilienceConfig, ResilientNode, RetryPolicy};
/// # use async_trait::async_trait;
/// # use dataloom::node::{ExecutionContext, Node, NodeError};
/// # use dataloom::port::Port;
/// # use dataloom::types::PortValueMap;
/// # struct Fetcher;
/// # #[async_trait]
/// # impl Node for Fetcher {
/// #     fn id(&self) -> &str { "fetcher" }
/// #     fn input_ports(&self) -> &[Port] { &[] }
/// #     fn output_ports(&self) -> &[Port] { &[] }
/// #     async fn run(&self, _: &ExecutionContext) -> Result<PortValueMap, NodeError> {
/// #         Ok(PortValueMap::default())
/// #     }
/// # }
///
/// let dead_letters = Arc::new(DeadLetterQueue::new(DeadLetterConfig::default()));
/// let node = ResilientNode::new(
///     Fetcher,
///     ResilienceConfig::new()
///         .with_retry(RetryPolicy::new(3))
///         .with_dead_letter(dead_letters),
/// );
/// ```
pub struct ResilientNode {
    inner: Arc<dyn Node>,
    config: ResilienceConfig,
}

impl ResilientNode {
    /// Wrap a node value.
    pub fn new(inner: impl Node + 'static, config: ResilienceConfig) -> Self {
        Self::wrap(Arc::new(inner), config)
    }

    /// Wrap an already shared node.
    #[must_use]
    pub fn wrap(inner: Arc<dyn Node>, config: ResilienceConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped node.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Node> {
        &self.inner
    }

    /// One attempt: breaker-gated inner logic.
    async fn attempt(
        &self,
        ctx: &ExecutionContext,
        attempts: &AtomicU32,
    ) -> Result<PortValueMap, NodeError> {
        attempts.fetch_add(1, Ordering::Relaxed);
        match &self.config.breaker {
            Some(breaker) => breaker.execute(|| self.inner.run(ctx)).await,
            None => self.inner.run(ctx).await,
        }
    }
}

#[async_trait]
impl Node for ResilientNode {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn input_ports(&self) -> &[Port] {
        self.inner.input_ports()
    }

    fn output_ports(&self) -> &[Port] {
        self.inner.output_ports()
    }

    fn validate(&self) -> bool {
        self.inner.validate()
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        let attempts = AtomicU32::new(0);
        let outcome = match &self.config.retry {
            Some(policy) => policy.execute(|| self.attempt(ctx, &attempts)).await,
            None => self.attempt(ctx, &attempts).await,
        };

        let error = match outcome {
            Ok(outputs) => return Ok(outputs),
            Err(error) => error,
        };

        let error = match &self.config.fallback {
            Some(fallback) => match fallback(&error, ctx) {
                Ok(outputs) => {
                    tracing::info!(node = self.id(), "fallback substituted a result");
                    return Ok(outputs);
                }
                Err(fallback_error) => NodeError::new(
                    FailureKind::Fallback,
                    self.id(),
                    format!("fallback failed: {}", fallback_error.message),
                )
                .with_cause(error),
            },
            None => error,
        };

        if let Some(queue) = &self.config.dead_letter {
            queue.capture(
                ctx,
                self.id(),
                self.name(),
                &error,
                attempts.load(Ordering::Relaxed),
            );
        }

        if self.config.suppress_errors {
            tracing::debug!(node = self.id(), error = %error, "failure suppressed");
            return Ok(PortValueMap::default());
        }
        Err(error)
    }
}
