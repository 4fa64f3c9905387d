use std::time::Duration;

use thiserror::Error;

/// Application error type.
///
/// The taxonomy mirrors how failures are handled downstream: `InvalidDocId`
/// is fatal for the filing (retrying reproduces the same portal error),
/// `Timeout` is fatal for the attempt but worth retrying, and `Automation`
/// wraps anything the agent surfaced that the worker must re-raise so the
/// queue's retry policy can observe it.
#[derive(Debug, Error)]
pub enum FilerError {
    /// The portal rejected the submitted document number.
    #[error("portal rejected document number: {0}")]
    InvalidDocId(String),

    /// Browser launch, navigation, or script evaluation failed.
    #[error("browser error: {0}")]
    Browser(String),

    /// A bounded wait expired before the target rendered.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(String),

    /// The filing run failed; carried back to the queue for retry.
    #[error("automation failed: {0}")]
    Automation(String),

    /// Configuration could not be loaded or parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for FilerError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        FilerError::Browser(err.to_string())
    }
}

impl From<rusqlite::Error> for FilerError {
    fn from(err: rusqlite::Error) -> Self {
        FilerError::Store(err.to_string())
    }
}

/// Application result type.
pub type Result<T, E = FilerError> = std::result::Result<T, E>;
