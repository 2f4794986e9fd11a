//! Reconcilers that converge a project board toward its declared state

pub mod capabilities;
pub mod fields;
pub mod items;
pub mod owner;
pub mod project;

pub use capabilities::{advise_automation, advise_views};
pub use fields::{normalize_color, normalize_field_type, sync_fields, FieldSyncReport, FieldType};
pub use items::{backfill_items, derive_area, derive_priority, derive_status, ItemSyncReport};
pub use owner::resolve_owner;
pub use project::{
    ensure_project, find_project_by_number, find_project_by_title, find_repository,
    link_repository, ProjectOutcome,
};
