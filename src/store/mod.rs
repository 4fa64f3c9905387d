//! Filing persistence.
//!
//! The rest of the product consumes filings through plain CRUD, so the store
//! is a trait with a SQLite-backed default and an in-memory implementation
//! for tests. Status writes are row-level updates keyed by filing id and
//! must tolerate concurrent workers.

mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{FilerError, Result};
use crate::models::{FilingPayload, FilingRecord, FilingStatus};

pub use sqlite::SqliteFilingStore;

/// Configuration key for the operator kill switch. Compared by exact string
/// equality against `"true"`.
pub const AUTOMATION_ENABLED_KEY: &str = "automation_enabled";

#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Read a named configuration value. Callers must not cache the result
    /// across jobs; the kill switch relies on a fresh read per invocation.
    async fn setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Insert a new filing in `PENDING` and return its id.
    async fn create_filing(&self, doc_id: &str, payload: &FilingPayload) -> Result<i64>;

    async fn filing(&self, id: i64) -> Result<Option<FilingRecord>>;

    /// Transition a filing's status, setting or clearing the error message.
    async fn update_status(
        &self,
        id: i64,
        status: FilingStatus,
        error: Option<&str>,
    ) -> Result<()>;

    async fn set_receipt(&self, id: i64, receipt_ref: &str) -> Result<()>;

    /// Record a screenshot artifact against a filing.
    async fn record_artifact(&self, id: i64, path: &str) -> Result<()>;

    async fn artifacts_for(&self, id: i64) -> Result<Vec<String>>;

    /// Latest filing for a docId: the status surface the dashboard polls.
    async fn latest_by_doc_id(&self, doc_id: &str) -> Result<Option<FilingRecord>>;

    /// Filings awaiting pickup, oldest first.
    async fn pending_filings(&self) -> Result<Vec<FilingRecord>>;

    /// Filings stuck in `PROCESSING` longer than `older_than`; a crashed or
    /// timed-out worker leaves these behind and a sweep reconciles them.
    async fn stale_processing(&self, older_than: chrono::Duration) -> Result<Vec<i64>>;
}

/// In-memory store for tests.
pub struct MemoryFilingStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    filings: HashMap<i64, FilingRecord>,
    artifacts: HashMap<i64, Vec<String>>,
    settings: HashMap<String, String>,
}

impl MemoryFilingStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Rewind a filing's `updated_at`, for staleness tests.
    #[cfg(test)]
    pub async fn backdate(&self, id: i64, updated_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(rec) = inner.filings.get_mut(&id) {
            rec.updated_at = updated_at;
        }
    }
}

impl Default for MemoryFilingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(id: i64) -> FilerError {
    FilerError::Store(format!("no filing with id {id}"))
}

#[async_trait]
impl FilingStore for MemoryFilingStore {
    async fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn create_filing(&self, doc_id: &str, payload: &FilingPayload) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        inner.filings.insert(
            id,
            FilingRecord {
                id,
                doc_id: doc_id.to_string(),
                status: FilingStatus::Pending,
                payload: payload.clone(),
                error_message: None,
                receipt_ref: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn filing(&self, id: i64) -> Result<Option<FilingRecord>> {
        Ok(self.inner.read().await.filings.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: i64,
        status: FilingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let rec = inner.filings.get_mut(&id).ok_or_else(|| missing(id))?;
        rec.status = status;
        rec.error_message = error.map(str::to_string);
        rec.updated_at = Utc::now();
        Ok(())
    }

    async fn set_receipt(&self, id: i64, receipt_ref: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let rec = inner.filings.get_mut(&id).ok_or_else(|| missing(id))?;
        rec.receipt_ref = Some(receipt_ref.to_string());
        rec.updated_at = Utc::now();
        Ok(())
    }

    async fn record_artifact(&self, id: i64, path: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.filings.contains_key(&id) {
            return Err(missing(id));
        }
        inner.artifacts.entry(id).or_default().push(path.to_string());
        Ok(())
    }

    async fn artifacts_for(&self, id: i64) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .artifacts
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_by_doc_id(&self, doc_id: &str) -> Result<Option<FilingRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .filings
            .values()
            .filter(|r| r.doc_id == doc_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn pending_filings(&self) -> Result<Vec<FilingRecord>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<_> = inner
            .filings
            .values()
            .filter(|r| r.status == FilingStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.id));
        Ok(pending)
    }

    async fn stale_processing(&self, older_than: chrono::Duration) -> Result<Vec<i64>> {
        let cutoff = Utc::now() - older_than;
        Ok(self
            .inner
            .read()
            .await
            .filings
            .values()
            .filter(|r| r.status == FilingStatus::Processing && r.updated_at < cutoff)
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_transitions_are_persisted() {
        let store = MemoryFilingStore::new();
        let id = store
            .create_filing("P21000012345", &FilingPayload::default())
            .await
            .unwrap();

        let rec = store.filing(id).await.unwrap().unwrap();
        assert_eq!(rec.status, FilingStatus::Pending);

        store
            .update_status(id, FilingStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_status(id, FilingStatus::Failed, Some("portal error"))
            .await
            .unwrap();

        let rec = store.filing(id).await.unwrap().unwrap();
        assert_eq!(rec.status, FilingStatus::Failed);
        assert_eq!(rec.error_message.as_deref(), Some("portal error"));
    }

    #[tokio::test]
    async fn latest_by_doc_id_returns_newest() {
        let store = MemoryFilingStore::new();
        let first = store
            .create_filing("P21000012345", &FilingPayload::default())
            .await
            .unwrap();
        let second = store
            .create_filing("P21000012345", &FilingPayload::default())
            .await
            .unwrap();
        store
            .create_filing("L99000000001", &FilingPayload::default())
            .await
            .unwrap();

        let latest = store.latest_by_doc_id("P21000012345").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_ne!(latest.id, first);
        assert!(store.latest_by_doc_id("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let store = MemoryFilingStore::new();
        assert!(store.setting(AUTOMATION_ENABLED_KEY).await.unwrap().is_none());

        store
            .set_setting(AUTOMATION_ENABLED_KEY, "true")
            .await
            .unwrap();
        assert_eq!(
            store.setting(AUTOMATION_ENABLED_KEY).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn stale_processing_finds_only_old_processing_rows() {
        let store = MemoryFilingStore::new();
        let stuck = store
            .create_filing("P21000012345", &FilingPayload::default())
            .await
            .unwrap();
        let fresh = store
            .create_filing("L99000000001", &FilingPayload::default())
            .await
            .unwrap();

        store
            .update_status(stuck, FilingStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_status(fresh, FilingStatus::Processing, None)
            .await
            .unwrap();
        store
            .backdate(stuck, Utc::now() - chrono::Duration::hours(2))
            .await;

        let stale = store
            .stale_processing(chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(stale, vec![stuck]);
    }

    #[tokio::test]
    async fn artifacts_are_appended_per_filing() {
        let store = MemoryFilingStore::new();
        let id = store
            .create_filing("P21000012345", &FilingPayload::default())
            .await
            .unwrap();

        store
            .record_artifact(id, "/artifacts/P21000012345_payment_1.png")
            .await
            .unwrap();
        store
            .record_artifact(id, "/artifacts/P21000012345_crash_2.png")
            .await
            .unwrap();

        assert_eq!(store.artifacts_for(id).await.unwrap().len(), 2);
        assert!(store.record_artifact(999, "x.png").await.is_err());
    }
}
