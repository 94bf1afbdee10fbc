//! Exponential-backoff-with-jitter retry engine.
//!
//! Generalizes the host stack's `failsafe::retry::with_retry` (itself built on
//! `backoff::ExponentialBackoff`) with full jitter and a pluggable metrics
//! sink, and restricts retries to outcomes the caller marks retryable rather
//! than a fixed error-variant match.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rand::Rng;
use tokio::sync::watch;
use tracing::debug;

/// `(operation-name, attempt-number >= 1)`. Immutable; `next_attempt` returns
/// a new value rather than mutating in place.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Name of the operation being retried, used only for logging/metrics.
    pub operation: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl RetryContext {
    /// Start a new context at attempt 1.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attempt: 1,
        }
    }

    /// Return a new context for the next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// Sink for retry telemetry. The default implementation only emits `tracing`
/// events; a collaborator can implement this to feed a metrics system.
pub trait RetryMetrics: Send + Sync {
    /// Called once before the first attempt.
    fn on_start(&self, _ctx: &RetryContext) {}
    /// Called after every attempt, success or failure, with its duration.
    fn on_attempt(&self, _ctx: &RetryContext, _duration: Duration, _succeeded: bool) {}
    /// Called once the operation finishes (successfully or exhausted),
    /// with the total elapsed time and the number of attempts made.
    fn on_complete(&self, _ctx: &RetryContext, _total: Duration, _attempts: u32) {}
    /// Called when a delay is computed, reporting the planned value; the
    /// caller can compare against the actual sleep duration if it wants to
    /// detect scheduler skew.
    fn on_delay_planned(&self, _ctx: &RetryContext, _planned: Duration) {}
}

/// Default [`RetryMetrics`] sink: `tracing` only.
#[derive(Default)]
pub struct TracingRetryMetrics;

impl RetryMetrics for TracingRetryMetrics {
    fn on_attempt(&self, ctx: &RetryContext, duration: Duration, succeeded: bool) {
        debug!(
            operation = %ctx.operation,
            attempt = ctx.attempt,
            duration_ms = duration.as_millis() as u64,
            succeeded,
            "retry attempt completed"
        );
    }

    fn on_complete(&self, ctx: &RetryContext, total: Duration, attempts: u32) {
        debug!(
            operation = %ctx.operation,
            total_ms = total.as_millis() as u64,
            attempts,
            "retry sequence completed"
        );
    }
}

/// Exponential-backoff-with-full-jitter retry strategy.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl RetryStrategy {
    /// Build a strategy from explicit parameters.
    #[must_use]
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            max_attempts,
        }
    }

    /// A strategy that executes the operation exactly once, never retrying.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0, 1)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    fn jittered(delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let jittered = rand::thread_rng().gen_range(0..=millis.max(1));
        Duration::from_millis(jittered)
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(10), 2.0, 4)
    }
}

/// Run `operation`, retrying on retryable failures per `strategy`.
///
/// `operation` must be idempotent: it may be invoked more than once. `is_retryable`
/// classifies each `Err` value; only retryable errors trigger another attempt.
/// `cancel` is polled before each sleep; if it fires, the most recent failure
/// is returned immediately rather than waiting out the remaining delay.
pub async fn execute<F, Fut, T, E>(
    strategy: &RetryStrategy,
    operation_name: &str,
    metrics: &dyn RetryMetrics,
    mut cancel: Option<&mut watch::Receiver<bool>>,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut ctx = RetryContext::new(operation_name);
    metrics.on_start(&ctx);
    let started = std::time::Instant::now();
    let mut backoff = strategy.backoff();

    loop {
        let attempt_started = std::time::Instant::now();
        let result = operation().await;
        let succeeded = result.is_ok();
        metrics.on_attempt(&ctx, attempt_started.elapsed(), succeeded);

        match result {
            Ok(value) => {
                metrics.on_complete(&ctx, started.elapsed(), ctx.attempt);
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) || ctx.attempt >= strategy.max_attempts {
                    metrics.on_complete(&ctx, started.elapsed(), ctx.attempt);
                    return Err(err);
                }

                let Some(planned) = backoff.next_backoff() else {
                    metrics.on_complete(&ctx, started.elapsed(), ctx.attempt);
                    return Err(err);
                };
                let delay = RetryStrategy::jittered(planned);
                metrics.on_delay_planned(&ctx, planned);

                if let Some(cancel) = cancel.as_deref_mut() {
                    tokio::select! {
                        biased;
                        _ = cancel.changed() => {
                            metrics.on_complete(&ctx, started.elapsed(), ctx.attempt);
                            return Err(err);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }

                ctx = ctx.next_attempt();
            }
        }
    }
}
