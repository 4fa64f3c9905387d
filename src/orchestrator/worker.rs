//! Job worker: at-most-once processing semantics around the filing agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{FilerError, Result};
use crate::models::{FilingJob, FilingResult, FilingStatus};
use crate::orchestrator::FilingRunner;
use crate::services::Notifier;
use crate::store::{FilingStore, AUTOMATION_ENABLED_KEY};

/// Per-docId exclusive locks so two jobs for the same entity never race on
/// the remote portal. Released unconditionally when the guard drops.
#[derive(Clone, Default)]
pub struct DocLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DocLocks {
    pub async fn acquire(&self, doc_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Entries only the map still references are uncontended; drop
            // them so the map does not grow for the process lifetime.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(doc_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Consumes filing jobs and writes the durable status transitions the rest
/// of the product observes.
pub struct FilingWorker<S, R> {
    store: Arc<S>,
    runner: Arc<R>,
    notifier: Option<Notifier>,
    locks: DocLocks,
    job_timeout: Duration,
}

impl<S: FilingStore, R: FilingRunner> FilingWorker<S, R> {
    pub fn new(
        store: Arc<S>,
        runner: Arc<R>,
        notifier: Option<Notifier>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            notifier,
            locks: DocLocks::default(),
            job_timeout,
        }
    }

    /// Process one dequeued job.
    ///
    /// The kill switch is read fresh from the store on every invocation so
    /// operators can pause all automation without a deploy. When disabled,
    /// the filing goes straight to `MANUAL_REVIEW` and the job succeeds.
    /// That path is a deliberate short-circuit, not a failure.
    ///
    /// On automation failure the error is returned so the queue's retry
    /// policy can schedule another attempt.
    pub async fn process(&self, job: &FilingJob) -> Result<()> {
        info!("processing filing {} (doc {})", job.filing_id, job.doc_id);

        let enabled = self
            .store
            .setting(AUTOMATION_ENABLED_KEY)
            .await?
            .as_deref()
            == Some("true");

        if !enabled {
            warn!(
                "automation is disabled globally; filing {} goes to manual review",
                job.filing_id
            );
            self.store
                .update_status(
                    job.filing_id,
                    FilingStatus::ManualReview,
                    Some("Automation disabled. Requires manual filing."),
                )
                .await?;
            self.notify(job, FilingStatus::ManualReview, Some("automation disabled"))
                .await;
            return Ok(());
        }

        let _doc_guard = self.locks.acquire(&job.doc_id).await;

        // Optimistic transition before any portal I/O: a crash mid-run
        // leaves visible evidence of an in-flight job.
        self.store
            .update_status(job.filing_id, FilingStatus::Processing, None)
            .await?;

        let result = match timeout(
            self.job_timeout,
            self.runner.run(&job.doc_id, &job.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => FilingResult::failed(
                format!(
                    "filing run exceeded the {}s wall-clock budget",
                    self.job_timeout.as_secs()
                ),
                None,
            ),
        };

        if result.success {
            let proof = result
                .screenshot_path
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();

            self.store
                .update_status(job.filing_id, FilingStatus::Success, None)
                .await?;
            if !proof.is_empty() {
                self.store.set_receipt(job.filing_id, &proof).await?;
                self.store.record_artifact(job.filing_id, &proof).await?;
            }
            info!("filing {} succeeded, proof at {proof}", job.filing_id);
            self.notify(job, FilingStatus::Success, None).await;
            Ok(())
        } else {
            let message = result
                .error
                .unwrap_or_else(|| "unknown automation error".to_string());
            self.store
                .update_status(job.filing_id, FilingStatus::Failed, Some(&message))
                .await?;
            if let Some(shot) = &result.screenshot_path {
                let path = shot.to_string_lossy();
                if let Err(e) = self.store.record_artifact(job.filing_id, &path).await {
                    warn!("could not record crash artifact for {}: {e}", job.filing_id);
                }
            }
            self.notify(job, FilingStatus::Failed, Some(&message)).await;
            Err(FilerError::Automation(message))
        }
    }

    /// Reconcile filings stuck in `PROCESSING` to `FAILED`.
    ///
    /// A worker crash or hard kill can strand a filing mid-run; the status
    /// lifecycle promises a terminal state, so a sweep closes them out.
    pub async fn reconcile_stale(&self, older_than: chrono::Duration) -> Result<usize> {
        let stale = self.store.stale_processing(older_than).await?;
        for id in &stale {
            warn!("filing {id} stuck in PROCESSING, reconciling to FAILED");
            self.store
                .update_status(
                    *id,
                    FilingStatus::Failed,
                    Some("processing window expired without a terminal status"),
                )
                .await?;
        }
        Ok(stale.len())
    }

    async fn notify(&self, job: &FilingJob, status: FilingStatus, detail: Option<&str>) {
        if let Some(notifier) = &self.notifier {
            notifier.filing_outcome(&job.doc_id, status, detail).await;
        }
    }
}
