//! Workflow layer: the complete flow for one filing. Holds no resources;
//! depends only on the portal capability and the address service.

pub mod navigator;

pub use navigator::{NavigationFailure, Navigator};
