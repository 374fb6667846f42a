//! Retry policy for source calls
//!
//! One policy object, parameterized by attempt budget, backoff schedule and a
//! retryable-error predicate, applied to every source call through [`RetryingSource`].

use super::{AuthorKey, AuthorRecord, PaperRecord, PaperSource, Recommendations};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether an error is worth another attempt
pub type RetryPredicate = fn(&AppError) -> bool;

/// Bounded exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    jitter: f64,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4)
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` calls in total (at least one)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.3,
            retryable: AppError::is_retryable,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Randomization factor applied to each delay (0.0 disables jitter)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval)
            .with_randomization_factor(self.jitter)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the budget is spent.
    ///
    /// A rate-limit error left over after the last attempt is surfaced as
    /// [`AppError::RateLimitExceeded`]; other errors are returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut schedule = self.schedule();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Source call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !(self.retryable)(&err) || attempt >= self.max_attempts {
                return Err(match err {
                    AppError::RateLimited { .. } => {
                        warn!(operation, attempts = attempt, "Rate limit budget exhausted");
                        AppError::RateLimitExceeded { attempts: attempt }
                    }
                    other => other,
                });
            }

            let mut delay = schedule.next_backoff().unwrap_or(self.max_interval);
            let rate_limited = matches!(err, AppError::RateLimited { .. });
            if let AppError::RateLimited {
                retry_after: Some(after),
            } = &err
            {
                delay = delay.max((*after).min(self.max_interval));
            }

            metrics::record_source_retry(rate_limited);
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Source call failed, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }
}

/// Source decorator applying a [`RetryPolicy`] to every call
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: PaperSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: PaperSource> PaperSource for RetryingSource<S> {
    async fn fetch_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>> {
        self.policy
            .run("fetch_paper", || self.inner.fetch_paper(paper_id))
            .await
    }

    async fn fetch_recommendations(
        &self,
        seed_ids: &[String],
        negative_ids: &[String],
        limit: usize,
    ) -> Result<Recommendations> {
        self.policy
            .run("fetch_recommendations", || {
                self.inner.fetch_recommendations(seed_ids, negative_ids, limit)
            })
            .await
    }

    async fn fetch_authors(&self, authors: &[AuthorKey]) -> Result<Vec<AuthorRecord>> {
        self.policy
            .run("fetch_authors", || self.inner.fetch_authors(authors))
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
