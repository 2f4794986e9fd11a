//! project-sync - declarative GitHub Projects v2 reconciliation
//!
//! Reads project documents from a configs directory and converges the live
//! boards toward them: projects, custom fields, repository links and items.
//! Also hosts the milestone-driven status updater used by issue workflows.

pub mod error;
pub mod github;
pub mod logging;
pub mod manifest;
pub mod milestone;
pub mod orchestrator;
pub mod reconcile;
pub mod settings;
