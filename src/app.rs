//! Application wiring and the long-running service loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::FilingJob;
use crate::orchestrator::{FilingAgent, FilingWorker};
use crate::queue::{FilingQueue, RetryPolicy};
use crate::services::{ArtifactStore, Notifier};
use crate::store::{FilingStore, SqliteFilingStore};

pub struct App {
    config: Config,
    store: Arc<SqliteFilingStore>,
    queue: FilingQueue,
    worker: FilingWorker<SqliteFilingStore, FilingAgent>,
    /// Filing ids already handed to the queue, so a poll cycle does not
    /// enqueue a still-pending row twice.
    seen: HashSet<i64>,
}

impl App {
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        info!("initializing filer against {}", config.portal_url);

        let artifacts = ArtifactStore::new(&config.artifacts_dir)
            .with_context(|| format!("creating artifacts dir {}", config.artifacts_dir))?;
        let store = Arc::new(
            SqliteFilingStore::open(&config.db_path)
                .with_context(|| format!("opening database {}", config.db_path))?,
        );

        let agent = Arc::new(FilingAgent::new(config.clone(), artifacts));
        let notifier = Notifier::from_config(&config);
        if notifier.is_none() {
            info!("no notification endpoint configured, outcomes will not be posted");
        }

        let worker = FilingWorker::new(
            store.clone(),
            agent,
            notifier,
            config.job_timeout(),
        );
        let queue = FilingQueue::new(RetryPolicy::from_config(&config));

        Ok(Self {
            config,
            store,
            queue,
            worker,
            seen: HashSet::new(),
        })
    }

    /// Poll-and-drain loop. Runs until ctrl-c.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let sweep = Duration::from_secs(self.config.stale_processing_secs.max(60));
        let mut poll_tick = tokio::time::interval(poll);
        let mut sweep_tick = tokio::time::interval(sweep);

        info!(
            "worker loop started, polling every {:?}, sweeping stale jobs every {:?}",
            poll, sweep
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    return Ok(());
                }
                _ = sweep_tick.tick() => {
                    self.sweep_stale().await;
                }
                _ = poll_tick.tick() => {
                    self.seed_pending().await;
                    self.drain_queue().await;
                }
            }
        }
    }

    /// Pull newly pending filings from the store into the queue.
    async fn seed_pending(&mut self) {
        let pending = match self.store.pending_filings().await {
            Ok(pending) => pending,
            Err(e) => {
                error!("could not scan for pending filings: {e}");
                return;
            }
        };

        // Filings that left PENDING no longer need dedup tracking; keeping
        // them would grow the set for the process lifetime.
        let pending_ids: HashSet<i64> = pending.iter().map(|r| r.id).collect();
        self.seen.retain(|id| pending_ids.contains(id));

        for record in pending {
            if !self.seen.insert(record.id) {
                continue;
            }
            self.queue
                .enqueue(FilingJob {
                    filing_id: record.id,
                    doc_id: record.doc_id,
                    payload: record.payload,
                })
                .await;
        }
    }

    /// Process every job whose backoff window has elapsed.
    async fn drain_queue(&self) {
        while let Some(queued) = self.queue.dequeue().await {
            if let Err(e) = self.worker.process(&queued.job).await {
                let filing_id = queued.job.filing_id;
                if !self.queue.retry(queued, &e.to_string()).await {
                    warn!("filing {filing_id} abandoned after exhausting retries");
                }
            }
        }
    }

    async fn sweep_stale(&self) {
        let older_than =
            chrono::Duration::seconds(self.config.stale_processing_secs as i64);
        match self.worker.reconcile_stale(older_than).await {
            Ok(0) => {}
            Ok(n) => warn!("reconciled {n} stale PROCESSING filings to FAILED"),
            Err(e) => error!("stale-processing sweep failed: {e}"),
        }
    }
}
