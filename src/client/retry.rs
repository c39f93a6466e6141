//! Exponential-backoff retry around a full failover walk.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::failover::WalkOutcome;
use crate::config::model::RetryOptions;
use crate::error::ConfigServerError;
use crate::metrics::ClientMetrics;

/// Attempt counter and backoff for one top-level load.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl RetryState {
    /// Fresh state; a disabled retry allows exactly one attempt.
    pub fn new(options: &RetryOptions) -> Self {
        let max_attempts = if options.enabled {
            options.max_attempts.max(1)
        } else {
            1
        };

        Self {
            attempt: 0,
            interval: Duration::from_millis(options.initial_interval),
            max_interval: Duration::from_millis(options.max_interval),
            multiplier: options.multiplier,
            max_attempts,
        }
    }

    /// Number of attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Marks the start of an attempt and returns its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Whether another attempt is allowed after the current one.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Returns the delay before the next attempt and grows the interval.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.interval.min(self.max_interval);

        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let grown = (self.interval.as_secs_f64() * multiplier).min(self.max_interval.as_secs_f64());
        self.interval = Duration::from_secs_f64(grown.max(0.0));

        delay
    }
}

/// Decides whether a failed walk is retried, swallowed or raised.
pub struct RetryPolicy<'a> {
    options: &'a RetryOptions,
    fail_fast: bool,
    metrics: Option<&'a ClientMetrics>,
}

impl<'a> RetryPolicy<'a> {
    /// Creates a policy from the retry options and the fail-fast flag.
    pub fn new(options: &'a RetryOptions, fail_fast: bool) -> Self {
        Self {
            options,
            fail_fast,
            metrics: None,
        }
    }

    /// Counts every exhausted walk in `metrics`.
    pub fn with_metrics(mut self, metrics: &'a ClientMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs `attempt` until it locates an environment, gets an authoritative
    /// "nothing here", or the attempts run out.
    ///
    /// When attempts run out the last `WalkOutcome::Exhausted` is returned,
    /// or `ConfigServerError::Exhausted` under fail-fast. Cancellation during an
    /// attempt or a backoff delay is returned as `ConfigServerError::Cancelled`
    /// and is never retried.
    pub async fn run<F, Fut>(
        &self,
        mut attempt: F,
        cancel: &CancellationToken,
    ) -> Result<WalkOutcome, ConfigServerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<WalkOutcome, ConfigServerError>>,
    {
        let mut state = RetryState::new(self.options);

        loop {
            if cancel.is_cancelled() {
                return Err(ConfigServerError::Cancelled);
            }

            let number = state.begin_attempt();
            let failures = match attempt(number).await? {
                WalkOutcome::Exhausted(failures) => failures,
                located => return Ok(located),
            };

            if let Some(metrics) = self.metrics {
                metrics.record_walk_exhausted();
            }

            if !state.can_retry() {
                if self.fail_fast {
                    error!(attempts = number, "All config server candidates failed");
                    return Err(ConfigServerError::Exhausted { failures });
                }

                warn!(
                    attempts = number,
                    failures = failures.len(),
                    "All config server candidates failed, continuing without remote configuration"
                );
                return Ok(WalkOutcome::Exhausted(failures));
            }

            let delay = state.next_delay();
            warn!(attempt = number, ?delay, "Config server load failed, retrying");

            tokio::select! {
                _ = cancel.cancelled() => return Err(ConfigServerError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
