//! Core data types shared across the queue, store, agent and worker.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilerError;

/// One unit of work handed to the worker once payment has been captured.
///
/// Field names match the JSON the checkout side enqueues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingJob {
    pub filing_id: i64,
    pub doc_id: String,
    pub payload: FilingPayload,
}

/// User-submitted filing data.
///
/// Only the mailing address is reconciled automatically; the other fields are
/// carried for the manual-review path and future automation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailing_address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub officers: Vec<Officer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ein: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_agent: Option<RegisteredAgent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_ra_service: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Officer {
    pub name: String,
    pub title: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAgent {
    pub name: String,
    pub address: String,
}

/// Persisted filing lifecycle.
///
/// `Pending → Processing → {Success | Failed | ManualReview}`. Only the
/// worker writes this field after job pickup. `Failed` means the automation
/// faulted; `ManualReview` means an operator deliberately paused automation.
/// Both need a human, but they are distinct outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilingStatus {
    Pending,
    Processing,
    Success,
    Failed,
    ManualReview,
}

impl FilingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilingStatus::Pending => "PENDING",
            FilingStatus::Processing => "PROCESSING",
            FilingStatus::Success => "SUCCESS",
            FilingStatus::Failed => "FAILED",
            FilingStatus::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Terminal statuses need no further worker action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FilingStatus::Success | FilingStatus::Failed | FilingStatus::ManualReview
        )
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilingStatus {
    type Err = FilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FilingStatus::Pending),
            "PROCESSING" => Ok(FilingStatus::Processing),
            "SUCCESS" => Ok(FilingStatus::Success),
            "FAILED" => Ok(FilingStatus::Failed),
            "MANUAL_REVIEW" => Ok(FilingStatus::ManualReview),
            other => Err(FilerError::Store(format!("unknown filing status: {other}"))),
        }
    }
}

/// A filing row as the store returns it.
#[derive(Debug, Clone)]
pub struct FilingRecord {
    pub id: i64,
    pub doc_id: String,
    pub status: FilingStatus,
    pub payload: FilingPayload,
    pub error_message: Option<String>,
    pub receipt_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one agent run. Immutable after creation; the worker maps it to
/// a persisted status transition.
#[derive(Debug, Clone)]
pub struct FilingResult {
    pub success: bool,
    pub screenshot_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl FilingResult {
    pub fn succeeded(screenshot_path: PathBuf) -> Self {
        Self {
            success: true,
            screenshot_path: Some(screenshot_path),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, screenshot_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            screenshot_path,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FilingStatus::Pending,
            FilingStatus::Processing,
            FilingStatus::Success,
            FilingStatus::Failed,
            FilingStatus::ManualReview,
        ] {
            assert_eq!(status.as_str().parse::<FilingStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<FilingStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!FilingStatus::Pending.is_terminal());
        assert!(!FilingStatus::Processing.is_terminal());
        assert!(FilingStatus::Success.is_terminal());
        assert!(FilingStatus::Failed.is_terminal());
        assert!(FilingStatus::ManualReview.is_terminal());
    }

    #[test]
    fn job_deserializes_from_queue_json() {
        let raw = r#"{
            "filingId": 42,
            "docId": "P21000012345",
            "payload": {
                "mailingAddress": "123 Test St Miami, FL 33101",
                "officers": [{"name": "Jane Roe", "title": "P", "address": "123 Test St Miami, FL 33101"}],
                "addRaService": true
            }
        }"#;

        let job: FilingJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.filing_id, 42);
        assert_eq!(job.doc_id, "P21000012345");
        assert_eq!(
            job.payload.mailing_address.as_deref(),
            Some("123 Test St Miami, FL 33101")
        );
        assert_eq!(job.payload.officers.len(), 1);
        assert_eq!(job.payload.add_ra_service, Some(true));
        assert!(job.payload.ein.is_none());
    }
}
