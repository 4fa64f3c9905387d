//! SQLite-backed filing store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{FilerError, Result};
use crate::models::{FilingPayload, FilingRecord, FilingStatus};
use crate::store::FilingStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS filings (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id        TEXT NOT NULL,
    status        TEXT NOT NULL,
    payload       TEXT NOT NULL,
    error_message TEXT,
    receipt_ref   TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_filings_doc_id ON filings(doc_id);
CREATE INDEX IF NOT EXISTS idx_filings_status ON filings(status);

CREATE TABLE IF NOT EXISTS artifacts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id  INTEGER NOT NULL REFERENCES filings(id),
    kind       TEXT NOT NULL,
    path       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Filing store on a SQLite file. Queries are short row-level operations, so
/// a single mutex-guarded connection is enough for the worker's write rate.
pub struct SqliteFilingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFilingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        debug!("filing store opened at {}", path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FilerError::Store("store connection poisoned".to_string()))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, Option<String>, Option<String>, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn build_record(
    raw: (i64, String, String, String, Option<String>, Option<String>, String, String),
) -> Result<FilingRecord> {
    let (id, doc_id, status, payload, error_message, receipt_ref, created_at, updated_at) = raw;
    Ok(FilingRecord {
        id,
        doc_id,
        status: status.parse()?,
        payload: serde_json::from_str(&payload)?,
        error_message,
        receipt_ref,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FilerError::Store(format!("bad timestamp {raw:?}: {e}")))
}

const SELECT_FILING: &str = "SELECT id, doc_id, status, payload, error_message, receipt_ref, \
                             created_at, updated_at FROM filings";

#[async_trait]
impl FilingStore for SqliteFilingStore {
    async fn setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    async fn create_filing(&self, doc_id: &str, payload: &FilingPayload) -> Result<i64> {
        let payload_json = serde_json::to_string(payload)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO filings (doc_id, status, payload, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![doc_id, FilingStatus::Pending.as_str(), payload_json, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn filing(&self, id: i64) -> Result<Option<FilingRecord>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("{SELECT_FILING} WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?
        };
        raw.map(build_record).transpose()
    }

    async fn update_status(
        &self,
        id: i64,
        status: FilingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE filings SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(FilerError::Store(format!("no filing with id {id}")));
        }
        Ok(())
    }

    async fn set_receipt(&self, id: i64, receipt_ref: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE filings SET receipt_ref = ?1, updated_at = ?2 WHERE id = ?3",
            params![receipt_ref, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(FilerError::Store(format!("no filing with id {id}")));
        }
        Ok(())
    }

    async fn record_artifact(&self, id: i64, path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO artifacts (filing_id, kind, path, created_at) \
             VALUES (?1, 'SCREENSHOT', ?2, ?3)",
            params![id, path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn artifacts_for(&self, id: i64) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT path FROM artifacts WHERE filing_id = ?1 ORDER BY id")?;
        let paths = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    async fn latest_by_doc_id(&self, doc_id: &str) -> Result<Option<FilingRecord>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("{SELECT_FILING} WHERE doc_id = ?1 ORDER BY id DESC LIMIT 1"),
                params![doc_id],
                row_to_record,
            )
            .optional()?
        };
        raw.map(build_record).transpose()
    }

    async fn pending_filings(&self) -> Result<Vec<FilingRecord>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare(&format!("{SELECT_FILING} WHERE status = ?1 ORDER BY id"))?;
            let rows = stmt
                .query_map(params![FilingStatus::Pending.as_str()], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(build_record).collect()
    }

    async fn stale_processing(&self, older_than: chrono::Duration) -> Result<Vec<i64>> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM filings WHERE status = ?1 AND updated_at < ?2 ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![FilingStatus::Processing.as_str(), cutoff], |row| {
                row.get(0)
            })?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilingPayload;
    use crate::store::AUTOMATION_ENABLED_KEY;

    fn payload() -> FilingPayload {
        FilingPayload {
            mailing_address: Some("123 Test St Miami, FL 33101".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn filing_round_trips_through_sqlite() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        let id = store.create_filing("P21000012345", &payload()).await.unwrap();

        let rec = store.filing(id).await.unwrap().unwrap();
        assert_eq!(rec.doc_id, "P21000012345");
        assert_eq!(rec.status, FilingStatus::Pending);
        assert_eq!(
            rec.payload.mailing_address.as_deref(),
            Some("123 Test St Miami, FL 33101")
        );
    }

    #[tokio::test]
    async fn status_receipt_and_artifacts_persist() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        let id = store.create_filing("P21000012345", &payload()).await.unwrap();

        store
            .update_status(id, FilingStatus::Success, None)
            .await
            .unwrap();
        store
            .set_receipt(id, "/artifacts/P21000012345_payment_1.png")
            .await
            .unwrap();
        store
            .record_artifact(id, "/artifacts/P21000012345_payment_1.png")
            .await
            .unwrap();

        let rec = store.filing(id).await.unwrap().unwrap();
        assert_eq!(rec.status, FilingStatus::Success);
        assert!(rec.receipt_ref.is_some());
        assert_eq!(store.artifacts_for(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_filing_errors() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        assert!(store
            .update_status(42, FilingStatus::Failed, Some("x"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn pending_and_latest_queries() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        let first = store.create_filing("P21000012345", &payload()).await.unwrap();
        let second = store.create_filing("P21000012345", &payload()).await.unwrap();

        store
            .update_status(first, FilingStatus::Success, None)
            .await
            .unwrap();

        let pending = store.pending_filings().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);

        let latest = store.latest_by_doc_id("P21000012345").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
    }

    #[tokio::test]
    async fn kill_switch_setting_round_trips() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        store
            .set_setting(AUTOMATION_ENABLED_KEY, "false")
            .await
            .unwrap();
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
    async fn stale_processing_uses_the_cutoff() {
        let store = SqliteFilingStore::open_in_memory().unwrap();
        let id = store.create_filing("P21000012345", &payload()).await.unwrap();
        store
            .update_status(id, FilingStatus::Processing, None)
            .await
            .unwrap();

        // A generous cutoff finds nothing; a negative one (cutoff in the
        // future) catches the row just written.
        assert!(store
            .stale_processing(chrono::Duration::hours(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .stale_processing(chrono::Duration::seconds(-5))
                .await
                .unwrap(),
            vec![id]
        );
    }
}
