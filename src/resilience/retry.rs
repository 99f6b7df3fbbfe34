//! Retry with capped exponential backoff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::node::{FailureKind, NodeError};

/// Decides whether a failed attempt should be retried.
pub type RetryPredicate = Arc<dyn Fn(&NodeError) -> bool + Send + Sync>;

/// Observer invoked before each backoff sleep with the attempt number
/// (1-based), the error that triggered the retry, and the chosen delay.
pub type RetryObserver = Arc<dyn Fn(u32, &NodeError, Duration) + Send + Sync>;

/// Retry policy with capped exponential backoff and optional jitter.
///
/// The policy makes up to `max_attempts` tries. After a failed attempt
/// it consults the retry predicate: a custom one when supplied, else
/// the default that retries everything except validation,
/// authentication, and authorization failures. When it gives up, the
/// last error is wrapped under [`FailureKind::RetryExhausted`] citing
/// the attempt count.
///
/// The delay before attempt `n + 1` is
/// `min(initial_delay × backoff_multiplier^(n-1), max_delay)`,
/// optionally randomized to ±25%.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use dataloom::resilience::RetryPolicy;
/// # use dataloom::node::NodeError;
/// # async fn example() {
/// let policy = RetryPolicy::new(3)
///     .with_initial_delay(Duration::from_millis(100))
///     .with_backoff_multiplier(2.0);
///
/// let value: Result<u32, NodeError> = policy.execute(|| async { Ok(42) }).await;
/// assert_eq!(value.unwrap(), 42);
/// # }
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
    jitter: bool,
    retry_if: Option<RetryPredicate>,
    on_retry: Option<RetryObserver>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
            retry_if: None,
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// A policy making up to `max_attempts` tries (minimum 1).
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Growth factor applied per completed attempt.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Upper bound on any single delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Randomize each delay to ±25% of the computed value.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Replace the default kind-based retry decision.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&NodeError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Hook invoked before each backoff sleep.
    #[must_use]
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &NodeError, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Configured attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` under this policy.
    ///
    /// The operation is re-created per attempt; suspension happens only
    /// in the backoff sleeps between attempts.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !self.should_retry(&error) {
                        return Err(self.exhausted(error, attempt));
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after backoff"
                    );
                    if let Some(observer) = &self.on_retry {
                        observer(attempt, &error, delay);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn should_retry(&self, error: &NodeError) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }

    /// Backoff before attempt `completed + 1`; `completed` is 1-based.
    fn delay_for(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1) as i32;
        let raw = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let final_secs = if self.jitter {
            capped * rand::rng().random_range(0.75..=1.25)
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs.max(0.0))
    }

    fn exhausted(&self, error: NodeError, attempts: u32) -> NodeError {
        NodeError::new(
            FailureKind::RetryExhausted,
            error.node_id.clone(),
            format!("giving up after {attempts} of {} attempt(s)", self.max_attempts),
        )
        .with_cause(error)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<fn>"))
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
