//! Milestone-driven status transition
//!
//! Handles one issue webhook event: when the issue's milestone matches the
//! configured milestone, the issue is put on the configured project (if it is
//! not already there) and its status field is set to the configured option.
//! There is no partial-failure isolation here, any error ends the run.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::github::{field_named, GraphqlClient, Project, ProjectItem};
use crate::reconcile::fields::fetch_fields;
use crate::reconcile::items::{add_project_item, fetch_project_items, set_single_select};
use crate::reconcile::project::find_project_by_number;
use crate::settings::Settings;

/// The parts of an `issues` webhook payload the updater reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueEvent {
    #[serde(default)]
    pub issue: Option<EventIssue>,
    #[serde(default)]
    pub repository: Option<EventRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventIssue {
    /// GraphQL node id
    pub node_id: String,
    pub number: u64,
    #[serde(default)]
    pub milestone: Option<EventMilestone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventMilestone {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub owner: EventAccount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventAccount {
    pub login: String,
}

impl IssueEvent {
    /// Parse an event payload
    pub fn parse(text: &str) -> SyncResult<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::Event(e.to_string()))
    }

    /// Read and parse the event payload at `path`
    pub fn from_path(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Event(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    fn milestone_title(&self) -> Option<&str> {
        self.issue
            .as_ref()?
            .milestone
            .as_ref()?
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Why an event did not lead to a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// The payload has no issue
    NoIssue,
    /// The issue has no milestone
    NoMilestone,
    /// The issue's milestone is not the configured one
    MilestoneMismatch { milestone: String },
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOpReason::NoIssue => write!(f, "event has no issue"),
            NoOpReason::NoMilestone => write!(f, "issue has no milestone"),
            NoOpReason::MilestoneMismatch { milestone } => {
                write!(f, "milestone '{}' is not tracked", milestone)
            }
        }
    }
}

/// Everything needed to apply the transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneTarget {
    pub issue_id: String,
    pub issue_number: u64,
    pub owner: String,
    pub project_number: u64,
}

/// Result of evaluating an event against the settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Skip(NoOpReason),
    Apply(MilestoneTarget),
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneOutcome {
    NoOp(NoOpReason),
    StatusSet {
        project_number: u64,
        issue_number: u64,
        item_id: String,
        /// Whether the issue had to be added to the project first
        added: bool,
        option: String,
    },
}

/// Moves milestoned issues into the configured status
#[derive(Debug, Clone)]
pub struct MilestoneStatusUpdater {
    milestone_name: Option<String>,
    project_number: Option<u64>,
    owner: Option<String>,
    status_field: String,
    status_option: String,
}

impl MilestoneStatusUpdater {
    pub fn new(settings: &Settings) -> Self {
        Self {
            milestone_name: settings
                .milestone_name
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            project_number: settings.project_number,
            owner: settings.default_owner(),
            status_field: settings.status_field_name.clone(),
            status_option: settings.status_option_name.clone(),
        }
    }

    /// Decide whether `event` should change anything
    ///
    /// Needs no network access. Missing settings are only an error once the
    /// event would otherwise apply.
    pub fn evaluate(&self, event: &IssueEvent) -> SyncResult<Trigger> {
        let Some(issue) = &event.issue else {
            return Ok(Trigger::Skip(NoOpReason::NoIssue));
        };
        let Some(milestone) = event.milestone_title() else {
            return Ok(Trigger::Skip(NoOpReason::NoMilestone));
        };

        let expected = self
            .milestone_name
            .as_deref()
            .ok_or_else(|| SyncError::Settings("MILESTONE_NAME is required".to_string()))?;
        if !milestone.eq_ignore_ascii_case(expected) {
            return Ok(Trigger::Skip(NoOpReason::MilestoneMismatch {
                milestone: milestone.to_string(),
            }));
        }

        let project_number = self
            .project_number
            .ok_or_else(|| SyncError::Settings("PROJECT_NUMBER is required".to_string()))?;
        let owner = self
            .owner
            .clone()
            .or_else(|| event.repository.as_ref().map(|r| r.owner.login.clone()))
            .ok_or_else(|| {
                SyncError::Settings(
                    "PROJECT_OWNER or GITHUB_REPOSITORY_OWNER is required".to_string(),
                )
            })?;

        Ok(Trigger::Apply(MilestoneTarget {
            issue_id: issue.node_id.clone(),
            issue_number: issue.number,
            owner,
            project_number,
        }))
    }

    /// Put the issue on the project and select the status option
    pub async fn apply(
        &self,
        client: &GraphqlClient,
        target: &MilestoneTarget,
    ) -> SyncResult<MilestoneOutcome> {
        let project: Project =
            find_project_by_number(client, &target.owner, target.project_number).await?;
        debug!(project = %project.title, number = project.number, "resolved project");

        let (item, added) = ensure_project_item(client, &project.id, &target.issue_id).await?;

        let fields = fetch_fields(client, &project.id).await?;
        let field = field_named(&fields, &self.status_field)
            .ok_or_else(|| SyncError::FieldNotFound(self.status_field.clone()))?;
        let option = field
            .option_named(&self.status_option)
            .ok_or_else(|| SyncError::OptionNotFound {
                field: field.name.clone(),
                option: self.status_option.clone(),
            })?;

        set_single_select(client, &project.id, &item.id, &field.id, &option.id).await?;
        info!(
            issue = target.issue_number,
            project = target.project_number,
            status = %option.name,
            "issue status updated"
        );

        Ok(MilestoneOutcome::StatusSet {
            project_number: project.number,
            issue_number: target.issue_number,
            item_id: item.id,
            added,
            option: option.name.clone(),
        })
    }

    /// Evaluate and, when triggered, apply
    pub async fn run(
        &self,
        client: &GraphqlClient,
        event: &IssueEvent,
    ) -> SyncResult<MilestoneOutcome> {
        match self.evaluate(event)? {
            Trigger::Skip(reason) => {
                info!(%reason, "nothing to do");
                Ok(MilestoneOutcome::NoOp(reason))
            }
            Trigger::Apply(target) => self.apply(client, &target).await,
        }
    }
}

fn find_item(items: Vec<ProjectItem>, content_id: &str) -> Option<ProjectItem> {
    items
        .into_iter()
        .find(|i| i.content_id() == Some(content_id))
}

/// Find the project item for `content_id`, adding the content when missing
///
/// Membership is checked before adding. If the add is still rejected because
/// the item exists (another run added it in between), the project is scanned
/// again and the existing item returned. Returns the item and whether it was
/// added by this call.
pub async fn ensure_project_item(
    client: &GraphqlClient,
    project_id: &str,
    content_id: &str,
) -> SyncResult<(ProjectItem, bool)> {
    if let Some(item) = find_item(fetch_project_items(client, project_id).await?, content_id) {
        debug!(item_id = %item.id, "issue already on project");
        return Ok((item, false));
    }

    match add_project_item(client, project_id, content_id).await {
        Ok(item_id) => Ok((
            ProjectItem {
                id: item_id,
                content: None,
                selections: Default::default(),
            },
            true,
        )),
        Err(err) if err.is_already_exists() => {
            debug!(content_id, error = %err, "add raced with another writer, scanning again");
            find_item(fetch_project_items(client, project_id).await?, content_id)
                .map(|item| (item, false))
                .ok_or_else(|| SyncError::ItemAdd {
                    content_id: content_id.to_string(),
                    source: err,
                })
        }
        Err(source) => Err(SyncError::ItemAdd {
            content_id: content_id.to_string(),
            source,
        }),
    }
}
