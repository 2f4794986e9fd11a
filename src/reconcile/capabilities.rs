//! Views and automation rules
//!
//! The Projects v2 API has no mutations for either, so requested ones are
//! reported for manual setup instead of synced.

use tracing::warn;

use crate::manifest::ProjectConfig;

const PREVIEW_LIMIT: usize = 3;

fn preview(names: impl Iterator<Item = String>) -> String {
    names.take(PREVIEW_LIMIT).collect::<Vec<_>>().join(", ")
}

/// Warn about views that need manual configuration
///
/// Returns the number of views requested.
pub fn advise_views(config: &ProjectConfig) -> usize {
    let count = config.views.len();
    if count > 0 {
        warn!(
            project = %config.name,
            count,
            views = %preview(config.views.iter().map(|v| v.name.clone())),
            "views cannot be managed through the API, configure them manually"
        );
    }
    count
}

/// Warn about automation rules that need manual configuration
///
/// Returns the number of rules requested.
pub fn advise_automation(config: &ProjectConfig) -> usize {
    let count = config.automation.len();
    if count > 0 {
        warn!(
            project = %config.name,
            count,
            rules = %preview(config.automation.iter().map(|r| r.summary())),
            "automation rules cannot be managed through the API, configure workflows manually"
        );
    }
    count
}
