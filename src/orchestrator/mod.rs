//! Orchestration layer: the agent that runs one filing end to end, and the
//! worker that maps agent outcomes to durable status transitions.

pub mod agent;
pub mod worker;

use async_trait::async_trait;

use crate::models::{FilingPayload, FilingResult};

/// One end-to-end filing run.
///
/// A trait seam so the worker is testable without a browser. The real
/// implementation is [`agent::FilingAgent`].
#[async_trait]
pub trait FilingRunner: Send + Sync {
    /// Never fails at the type level; internal failures come back inside
    /// the [`FilingResult`] so the worker's control flow stays uniform.
    async fn run(&self, doc_id: &str, payload: &FilingPayload) -> FilingResult;
}

pub use agent::FilingAgent;
pub use worker::FilingWorker;
