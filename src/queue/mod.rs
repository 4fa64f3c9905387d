//! In-process filing job queue with bounded, backed-off retries.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::FilingJob;

/// Retry behavior, decoupled from the worker so it is testable on its own.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            multiplier: config.retry_multiplier,
        }
    }

    /// Backoff before the next attempt, given how many attempts have run.
    pub fn delay_for(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1);
        Duration::from_secs_f64(
            self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32),
        )
    }

    pub fn attempts_left(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }
}

/// A job plus its scheduling state.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: FilingJob,
    pub attempt: u32,
    pub not_before: DateTime<Utc>,
}

/// FIFO queue of filing jobs; retried jobs re-enter with a backoff delay.
pub struct FilingQueue {
    policy: RetryPolicy,
    jobs: Mutex<VecDeque<QueuedJob>>,
}

impl FilingQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, job: FilingJob) {
        debug!("enqueueing filing {} (doc {})", job.filing_id, job.doc_id);
        let mut jobs = self.jobs.lock().await;
        jobs.push_back(QueuedJob {
            job,
            attempt: 1,
            not_before: Utc::now(),
        });
    }

    /// Pop the first job whose backoff window has elapsed.
    pub async fn dequeue(&self) -> Option<QueuedJob> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let idx = jobs.iter().position(|q| q.not_before <= now)?;
        jobs.remove(idx)
    }

    /// Re-enqueue a failed job with backoff. Returns `false` when the
    /// attempt cap is reached and the job is abandoned.
    pub async fn retry(&self, mut queued: QueuedJob, error: &str) -> bool {
        if !self.policy.attempts_left(queued.attempt) {
            warn!(
                "filing {} failed on attempt {}/{} and is out of retries: {}",
                queued.job.filing_id, queued.attempt, self.policy.max_attempts, error
            );
            return false;
        }

        let delay = self.policy.delay_for(queued.attempt);
        queued.attempt += 1;
        queued.not_before = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        debug!(
            "scheduling retry {}/{} for filing {} in {:?}: {}",
            queued.attempt, self.policy.max_attempts, queued.job.filing_id, delay, error
        );

        let mut jobs = self.jobs.lock().await;
        jobs.push_back(queued);
        true
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
