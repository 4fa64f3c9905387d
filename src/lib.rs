//! Automated Florida annual-report filing service.
//!
//! Layered bottom-up:
//! - `infrastructure`: the [`infrastructure::PortalPage`] seam over a
//!   chromiumoxide page, so page interactions are testable without a browser
//! - `services`: address parsing and comparison, screenshot artifacts,
//!   outcome notification
//! - `workflow`: the portal navigator that drives one filing through the
//!   Sunbiz pages
//! - `orchestrator`: the browser-owning agent and the job worker that maps
//!   run outcomes to durable status transitions
//! - `app`: wiring plus the poll-and-drain service loop

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod services;
pub mod store;
pub mod workflow;

pub use app::App;
pub use config::Config;
pub use error::{FilerError, Result};
pub use models::{FilingJob, FilingPayload, FilingResult, FilingStatus};
