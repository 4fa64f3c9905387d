//! Filing agent: owns the browser lifecycle for one run.

use async_trait::async_trait;
use tracing::{error, info};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::ChromiumPage;
use crate::models::{FilingPayload, FilingResult};
use crate::orchestrator::FilingRunner;
use crate::services::ArtifactStore;
use crate::workflow::Navigator;

/// Runs one filing per call against a dedicated browser session. No session
/// reuse: each job gets an isolated browser so no cookies or portal state
/// leak between jobs.
pub struct FilingAgent {
    config: Config,
    artifacts: ArtifactStore,
}

impl FilingAgent {
    pub fn new(config: Config, artifacts: ArtifactStore) -> Self {
        Self { config, artifacts }
    }
}

#[async_trait]
impl FilingRunner for FilingAgent {
    async fn run(&self, doc_id: &str, payload: &FilingPayload) -> FilingResult {
        info!("starting filing run for {doc_id}");

        let session = match browser::launch_headless().await {
            Ok(session) => session,
            Err(e) => {
                error!("browser launch failed for {doc_id}: {e}");
                return FilingResult::failed(format!("browser launch failed: {e}"), None);
            }
        };

        let portal = ChromiumPage::new(session.page());
        let navigator = Navigator::new(&self.config);
        let outcome = navigator
            .execute(&portal, doc_id, payload, &self.artifacts)
            .await;

        // Teardown on every path; a cancelled run closes through the
        // session's drop guard instead.
        session.shutdown().await;

        match outcome {
            Ok(proof) => FilingResult::succeeded(proof),
            Err(failure) => {
                error!("filing run for {doc_id} failed: {}", failure.error);
                FilingResult::failed(failure.error.to_string(), failure.screenshot)
            }
        }
    }
}
