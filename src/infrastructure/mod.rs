//! Infrastructure layer: owns scarce resources and exposes capabilities only.

pub mod portal;

pub use portal::{ChromiumPage, PortalPage};
