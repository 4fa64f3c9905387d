//! Fire-and-forget outcome notification.
//!
//! The product's email side owns rendering and delivery; this client only
//! posts the outcome to its HTTP endpoint. Best-effort by contract: a
//! delivery failure is logged and never fails the job.

use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::FilingStatus;

pub struct Notifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl Notifier {
    /// Build a notifier from config; `None` when no endpoint is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if config.notify_api_url.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            api_url: config.notify_api_url.clone(),
            api_key: config.notify_api_key.clone(),
        })
    }

    /// Post a terminal filing outcome. Never returns an error.
    pub async fn filing_outcome(&self, doc_id: &str, status: FilingStatus, detail: Option<&str>) {
        let body = json!({
            "docId": doc_id,
            "status": status.as_str(),
            "detail": detail,
        });

        let result = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("notified {} outcome for {}", status, doc_id);
            }
            Ok(response) => {
                warn!(
                    "notification endpoint returned {} for {} ({})",
                    response.status(),
                    doc_id,
                    status
                );
            }
            Err(e) => {
                warn!("could not deliver {} notification for {}: {}", status, doc_id, e);
            }
        }
    }
}
