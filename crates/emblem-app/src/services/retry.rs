//! Quota-aware retry around a single classification call.

use std::time::Duration;

use backon::{BackoffBuilder, Retryable};
use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::pipeline::ClassificationResult;
use crate::services::classifier::{Classifier, ServiceError};

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Backoff parameters for quota errors.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^n` plus a uniform
/// jitter in `[0, max_jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct RetryPolicy {
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    #[builder(default = DEFAULT_BASE_DELAY)]
    pub base_delay: Duration,
    #[builder(default = DEFAULT_MAX_JITTER)]
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry `retry`.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.min(20);
        self.base_delay.saturating_mul(2_u32.saturating_pow(exponent))
    }

    /// Full delay before retry `retry`, jitter included.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay_for(retry).saturating_add(jitter)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Delay sequence handed to `backon`, one entry per permitted retry.
#[derive(Debug)]
pub struct QuotaBackoff {
    policy: RetryPolicy,
    next_retry: u32,
}

impl Iterator for QuotaBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_retry > self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(self.next_retry);
        self.next_retry += 1;
        Some(delay)
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = QuotaBackoff;

    fn build(self) -> Self::Backoff {
        QuotaBackoff {
            policy: self,
            next_retry: 1,
        }
    }
}

/// Why a placeholder replaced the classifier's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Unidentified,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyOutcome {
    pub result: ClassificationResult,
    pub attempts: u32,
    pub fallback: Option<Fallback>,
}

/// Retries transient classifier failures and demotes everything else to a
/// placeholder result, so a single bad item never aborts the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn classify(&self, classifier: &dyn Classifier, content: &[u8]) -> ClassifyOutcome {
        let mut attempts: u32 = 0;

        let outcome = (|| {
            attempts += 1;
            classifier.classify(content)
        })
        .retry(self.policy)
        .sleep(sleep)
        .when(ServiceError::is_transient)
        .notify(|err: &ServiceError, delay: Duration| {
            warn!(
                delay_ms = delay.as_millis(),
                error = %err,
                "classifier rate limited; backing off"
            );
        })
        .await;

        match outcome {
            Ok(result) => ClassifyOutcome {
                result,
                attempts,
                fallback: None,
            },
            Err(err) if err.is_transient() => {
                warn!(attempts, error = %err, "classifier still rate limited after retries");
                ClassifyOutcome {
                    result: ClassificationResult::rate_limited(),
                    attempts,
                    fallback: Some(Fallback::RateLimited),
                }
            }
            Err(err) => {
                warn!(attempts, error = %err, "classifier failed");
                ClassifyOutcome {
                    result: ClassificationResult::unidentified(),
                    attempts,
                    fallback: Some(Fallback::Unidentified),
                }
            }
        }
    }
}
