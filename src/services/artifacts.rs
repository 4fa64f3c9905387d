//! Screenshot artifact naming and storage.
//!
//! Artifacts are the audit evidence of a run. Filenames are
//! `{docId}_{stage}_{unixMillis}.png` so concurrent jobs targeting the same
//! docId never collide on the shared directory.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Which point of the run a screenshot documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Diagnostic shot of the portal landing page, taken unconditionally.
    Landing,
    /// Full-page shot of the payment page; the proof-of-filing deliverable.
    Payment,
    /// Error-state shot captured before a failure propagates.
    Crash,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Landing => "landing",
            Stage::Payment => "payment",
            Stage::Crash => "crash",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle on the shared artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the artifacts directory, creating it if absent (idempotent).
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collision-resistant path for a new screenshot.
    pub fn path_for(&self, doc_id: &str, stage: Stage) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.root.join(format!("{doc_id}_{stage}_{millis}.png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_directory_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("artifacts");

        let first = ArtifactStore::new(&root).unwrap();
        let second = ArtifactStore::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(first.root(), second.root());
    }

    #[test]
    fn filenames_carry_doc_stage_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let path = store.path_for("P21000012345", Stage::Payment);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("P21000012345_payment_"));
        assert!(name.ends_with(".png"));

        let crash = store.path_for("P21000012345", Stage::Crash);
        assert!(crash
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("_crash_"));
    }
}
