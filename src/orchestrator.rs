//! Multi-project sync
//!
//! Runs every loaded project document through owner resolution, project
//! reconciliation, field sync, capability advisories and (when a repository
//! is configured) item backfill. Projects are processed one at a time and a
//! failing project never stops the others.

use serde::Serialize;
use tracing::{error, info, info_span, Instrument};

use crate::error::{SyncError, SyncResult};
use crate::github::{GraphqlClient, Project};
use crate::manifest::ProjectConfig;
use crate::reconcile::{
    advise_automation, advise_views, backfill_items, ensure_project, find_repository,
    resolve_owner, sync_fields, ItemSyncReport, ProjectOutcome,
};
use crate::settings::{RepoRef, Settings};

/// Field sync counts for one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of syncing one project document
#[derive(Debug, Clone, Serialize)]
pub struct ProjectResult {
    /// Project title from the document
    pub name: String,
    /// Document the project came from
    pub source_file: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created: bool,
    pub updated_fields: Vec<String>,
    pub linked: bool,
    pub fields: FieldCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemSyncReport>,
    /// Views and automation rules that need manual setup
    pub advisories: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectResult {
    fn new(config: &ProjectConfig) -> Self {
        Self {
            name: config.name.clone(),
            source_file: config.source_file.display().to_string(),
            success: false,
            number: None,
            url: None,
            created: false,
            updated_fields: Vec::new(),
            linked: false,
            fields: FieldCounts::default(),
            items: None,
            advisories: 0,
            error: None,
        }
    }

    fn record_project(&mut self, outcome: &ProjectOutcome) {
        self.number = Some(outcome.project.number);
        self.url = outcome.project.url.clone();
        self.created = outcome.created;
        self.updated_fields = outcome.updated_fields.iter().map(|f| f.to_string()).collect();
        self.linked = outcome.linked;
    }
}

/// Summary of a multi-project run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Projects attempted
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ProjectResult>,
}

impl RunSummary {
    fn add_result(&mut self, result: ProjectResult) {
        self.total += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Whether every project synced cleanly
    pub fn all_successful(&self) -> bool {
        self.failed == 0
    }
}

/// Result of the single-project backfill entry point
#[derive(Debug, Clone)]
pub struct BackfillReport {
    pub project: Project,
    pub created: bool,
    pub linked: bool,
    pub items: ItemSyncReport,
}

/// Drives reconciliation for a set of project documents
pub struct Orchestrator {
    client: GraphqlClient,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(client: GraphqlClient, settings: Settings) -> Self {
        Self { client, settings }
    }

    /// Documents selected by `PROJECT_NAME`, or all of them
    pub fn select<'a>(&self, configs: &'a [ProjectConfig]) -> Vec<&'a ProjectConfig> {
        match self.settings.project_name() {
            Some(name) => configs
                .iter()
                .filter(|c| c.name.eq_ignore_ascii_case(name))
                .collect(),
            None => configs.iter().collect(),
        }
    }

    /// Sync every selected project, isolating failures per project
    pub async fn run(&self, configs: &[ProjectConfig]) -> RunSummary {
        let selected = self.select(configs);
        if selected.is_empty() {
            info!(
                filter = self.settings.project_name().unwrap_or(""),
                available = configs.len(),
                "no project documents selected"
            );
        }

        let mut summary = RunSummary::default();
        for config in selected {
            let span = info_span!("project", name = %config.name);
            let mut result = ProjectResult::new(config);
            match self.sync_project(config, &mut result).instrument(span).await {
                Ok(()) => result.success = true,
                Err(err) => {
                    error!(project = %config.name, file = %result.source_file, error = %err, "project sync failed");
                    result.error = Some(err.to_string());
                }
            }
            summary.add_result(result);
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "sync finished"
        );
        summary
    }

    async fn sync_project(&self, config: &ProjectConfig, result: &mut ProjectResult) -> SyncResult<()> {
        let owner = resolve_owner(&self.client, &config.owner).await?;

        let repo_ref = match &config.repository {
            Some(repo) => Some(repo.clone()),
            None => self.settings.repository()?,
        };
        let repository = match &repo_ref {
            Some(repo) => Some(find_repository(&self.client, repo).await?),
            None => None,
        };

        let outcome = ensure_project(&self.client, config, &owner, repository.as_ref()).await?;
        result.record_project(&outcome);

        let fields = sync_fields(&self.client, &outcome.project.id, &config.fields).await?;
        result.fields = FieldCounts {
            created: fields.created,
            updated: fields.updated,
            unchanged: fields.unchanged,
            skipped: fields.skipped,
            failed: fields.failed(),
        };

        result.advisories = advise_views(config) + advise_automation(config);

        if let Some(repo) = &repo_ref {
            let items = backfill_items(&self.client, &outcome.project.id, &repo.owner, &repo.name).await?;
            result.items = Some(items);
        }

        if fields.failed() > 0 {
            return Err(SyncError::FieldSync {
                field: fields
                    .failures
                    .iter()
                    .filter_map(|e| match e {
                        SyncError::FieldSync { field, .. } => Some(field.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                message: format!("{} field(s) failed to sync", fields.failed()),
            });
        }

        info!(
            project = %outcome.project.title,
            number = outcome.project.number,
            created = outcome.created,
            linked = outcome.linked,
            "project synced"
        );
        Ok(())
    }

    /// Ensure the `PROJECT_NAME` project exists and is linked to
    /// `GITHUB_REPOSITORY`, then backfill its items
    pub async fn backfill(&self) -> SyncResult<BackfillReport> {
        let name = self
            .settings
            .project_name()
            .ok_or_else(|| SyncError::Settings("PROJECT_NAME is required".to_string()))?;
        let repo: RepoRef = self
            .settings
            .repository()?
            .ok_or_else(|| SyncError::Settings("GITHUB_REPOSITORY is required".to_string()))?;
        let owner_login = self.settings.default_owner().unwrap_or_else(|| repo.owner.clone());

        let owner = resolve_owner(&self.client, &owner_login).await?;
        let repository = find_repository(&self.client, &repo).await?;

        let config = ProjectConfig {
            source_file: "PROJECT_NAME".into(),
            owner: owner_login,
            name: name.to_string(),
            description: None,
            public: None,
            repository: Some(repo.clone()),
            fields: Vec::new(),
            views: Vec::new(),
            automation: Vec::new(),
        };
        let outcome = ensure_project(&self.client, &config, &owner, Some(&repository)).await?;
        let items = backfill_items(&self.client, &outcome.project.id, &repo.owner, &repo.name).await?;

        Ok(BackfillReport {
            project: outcome.project,
            created: outcome.created,
            linked: outcome.linked,
            items,
        })
    }
}
