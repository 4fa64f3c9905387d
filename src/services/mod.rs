//! Business capabilities: single-purpose services the workflow composes.

pub mod address;
pub mod artifacts;
pub mod notify;

pub use address::{addresses_match, clean_address, parse_address, ParsedAddress};
pub use artifacts::{ArtifactStore, Stage};
pub use notify::Notifier;
