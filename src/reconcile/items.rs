//! Item backfill
//!
//! Adds every issue and pull request of a repository to a project, then
//! derives Status, Area and Priority for each item from its own state and
//! labels.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::fields::fetch_fields;
use crate::error::{SyncError, SyncResult, TransportError};
use crate::github::{
    field_named, paginate, Connection, GraphqlClient, IssueContent, IssueState, ItemContent,
    ProjectItem, PullRequestContent, PullRequestState, RemoteField,
};

const PROJECT_ITEMS_QUERY: &str = r#"query ProjectItems($projectId: ID!, $after: String) {
  node(id: $projectId) {
    ... on ProjectV2 {
      items(first: 50, after: $after) {
        nodes {
          id
          content {
            __typename
            ... on Issue { id number state labels(first: 20) { nodes { name } } }
            ... on PullRequest { id number state merged labels(first: 20) { nodes { name } } }
          }
          fieldValues(first: 20) {
            nodes {
              __typename
              ... on ProjectV2ItemFieldSingleSelectValue {
                optionId
                field { ... on ProjectV2FieldCommon { id } }
              }
            }
          }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

const REPOSITORY_ISSUES_QUERY: &str = r#"query RepositoryIssues($owner: String!, $name: String!, $after: String) {
  repository(owner: $owner, name: $name) {
    issues(first: 50, after: $after, states: [OPEN, CLOSED]) {
      nodes { id number state labels(first: 20) { nodes { name } } }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const REPOSITORY_PULL_REQUESTS_QUERY: &str = r#"query RepositoryPullRequests($owner: String!, $name: String!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: 50, after: $after, states: [OPEN, CLOSED, MERGED]) {
      nodes { id number state merged labels(first: 20) { nodes { name } } }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const ADD_ITEM_MUTATION: &str = r#"mutation AddProjectItem($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemById(input: { projectId: $projectId, contentId: $contentId }) {
    item { id }
  }
}"#;

const SET_FIELD_VALUE_MUTATION: &str = r#"mutation SetItemFieldValue($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(
    input: { projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: { singleSelectOptionId: $optionId } }
  ) {
    projectV2Item { id }
  }
}"#;

pub const STATUS_FIELD: &str = "Status";
pub const AREA_FIELD: &str = "Area";
pub const PRIORITY_FIELD: &str = "Priority";

const AREAS: [(&str, &str); 5] = [
    ("frontend", "Frontend"),
    ("backend", "Backend"),
    ("infra", "Infrastructure"),
    ("database", "Database"),
    ("ai", "AI"),
];

const PRIORITIES: [(&str, &str); 4] = [
    ("critical", "Critical"),
    ("high", "High"),
    ("medium", "Medium"),
    ("low", "Low"),
];

#[derive(Debug, Deserialize)]
struct ItemsNode {
    items: Connection<ProjectItem>,
}

#[derive(Debug, Deserialize)]
struct ProjectItems {
    node: Option<ItemsNode>,
}

#[derive(Debug, Deserialize)]
struct IssuesNode {
    issues: Connection<IssueContent>,
}

#[derive(Debug, Deserialize)]
struct RepositoryIssues {
    repository: Option<IssuesNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestsNode {
    pull_requests: Connection<PullRequestContent>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPullRequests {
    repository: Option<PullRequestsNode>,
}

#[derive(Debug, Deserialize)]
struct AddedItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddItemPayload {
    item: AddedItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItem {
    add_project_v2_item_by_id: AddItemPayload,
}

/// Status an item should have given its content
///
/// Pull requests are `Done` once merged or closed and `Review` otherwise.
/// Issues are `Done` when closed, `Blocked` when labelled `blocked`, and
/// `Todo` otherwise. Draft items have no derived status.
pub fn derive_status(content: &ItemContent) -> Option<&'static str> {
    match content {
        ItemContent::PullRequest(pr) => {
            if pr.merged || matches!(pr.state, PullRequestState::Closed | PullRequestState::Merged)
            {
                Some("Done")
            } else {
                Some("Review")
            }
        }
        ItemContent::Issue(issue) => {
            if issue.state == IssueState::Closed {
                Some("Done")
            } else if issue.labels.iter().any(|l| l.eq_ignore_ascii_case("blocked")) {
                Some("Blocked")
            } else {
                Some("Todo")
            }
        }
        ItemContent::Other => None,
    }
}

fn first_prefixed_match(
    labels: &[String],
    prefix: &str,
    table: &[(&str, &'static str)],
) -> Option<&'static str> {
    labels.iter().find_map(|label| {
        let label = label.trim().to_lowercase();
        let value = label.strip_prefix(prefix)?;
        table
            .iter()
            .find(|(key, _)| *key == value)
            .map(|(_, display)| *display)
    })
}

/// Area from the first `area:*` label that names a known area
pub fn derive_area(labels: &[String]) -> Option<&'static str> {
    first_prefixed_match(labels, "area:", &AREAS)
}

/// Priority from the first `priority:*` label that names a known priority
pub fn derive_priority(labels: &[String]) -> Option<&'static str> {
    first_prefixed_match(labels, "priority:", &PRIORITIES)
}

/// Counts from one backfill
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSyncReport {
    /// Items already in the project before the run
    pub existing: usize,
    /// Items added by this run
    pub added: usize,
    /// Adds rejected because another writer added the item first
    pub already_present: usize,
    /// Field values changed
    pub values_set: usize,
    /// Field values already correct
    pub values_unchanged: usize,
}

/// Fetch every item of a project with its content and single-select values
pub async fn fetch_project_items(
    client: &GraphqlClient,
    project_id: &str,
) -> SyncResult<Vec<ProjectItem>> {
    let items = paginate(|after| async move {
        let page: ProjectItems = client
            .query(
                PROJECT_ITEMS_QUERY,
                json!({ "projectId": project_id, "after": after }),
            )
            .await?;
        page.node
            .map(|n| n.items)
            .ok_or_else(|| TransportError::Decode(format!("project {} not found", project_id)))
    })
    .await?;
    Ok(items)
}

async fn fetch_issues(client: &GraphqlClient, owner: &str, name: &str) -> SyncResult<Vec<IssueContent>> {
    let issues = paginate(|after| async move {
        let page: RepositoryIssues = client
            .query(
                REPOSITORY_ISSUES_QUERY,
                json!({ "owner": owner, "name": name, "after": after }),
            )
            .await?;
        page.repository
            .map(|r| r.issues)
            .ok_or_else(|| TransportError::Decode(format!("repository {}/{} not found", owner, name)))
    })
    .await?;
    Ok(issues)
}

async fn fetch_pull_requests(
    client: &GraphqlClient,
    owner: &str,
    name: &str,
) -> SyncResult<Vec<PullRequestContent>> {
    let pulls = paginate(|after| async move {
        let page: RepositoryPullRequests = client
            .query(
                REPOSITORY_PULL_REQUESTS_QUERY,
                json!({ "owner": owner, "name": name, "after": after }),
            )
            .await?;
        page.repository
            .map(|r| r.pull_requests)
            .ok_or_else(|| TransportError::Decode(format!("repository {}/{} not found", owner, name)))
    })
    .await?;
    Ok(pulls)
}

/// Add content to a project, returning the new item id
pub async fn add_project_item(
    client: &GraphqlClient,
    project_id: &str,
    content_id: &str,
) -> Result<String, TransportError> {
    let added: AddItem = client
        .query(
            ADD_ITEM_MUTATION,
            json!({ "projectId": project_id, "contentId": content_id }),
        )
        .await?;
    Ok(added.add_project_v2_item_by_id.item.id)
}

/// Select a single-select option on an item
pub async fn set_single_select(
    client: &GraphqlClient,
    project_id: &str,
    item_id: &str,
    field_id: &str,
    option_id: &str,
) -> SyncResult<()> {
    client
        .query::<serde_json::Value>(
            SET_FIELD_VALUE_MUTATION,
            json!({
                "projectId": project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "optionId": option_id,
            }),
        )
        .await?;
    Ok(())
}

/// Add every issue and pull request of `owner/name` to the project and
/// derive their field values
///
/// # Errors
///
/// `SyncError::ItemAdd` when an add is rejected for any reason other than the
/// item already being present; transport failures propagate.
pub async fn backfill_items(
    client: &GraphqlClient,
    project_id: &str,
    owner: &str,
    name: &str,
) -> SyncResult<ItemSyncReport> {
    let mut report = ItemSyncReport::default();

    let mut items = fetch_project_items(client, project_id).await?;
    report.existing = items.len();
    let present: HashSet<String> = items
        .iter()
        .filter_map(|i| i.content_id().map(str::to_string))
        .collect();

    let issues = fetch_issues(client, owner, name).await?;
    let pulls = fetch_pull_requests(client, owner, name).await?;
    debug!(
        repository = %format!("{}/{}", owner, name),
        issues = issues.len(),
        pull_requests = pulls.len(),
        existing = report.existing,
        "fetched backfill inputs"
    );

    let contents = issues
        .into_iter()
        .map(ItemContent::Issue)
        .chain(pulls.into_iter().map(ItemContent::PullRequest));

    let mut refetch = false;
    for content in contents {
        let Some(content_id) = content.id().map(str::to_string) else {
            continue;
        };
        if present.contains(&content_id) {
            continue;
        }

        match add_project_item(client, project_id, &content_id).await {
            Ok(item_id) => {
                debug!(item = %content.describe(), item_id = %item_id, "added item");
                report.added += 1;
                items.push(ProjectItem {
                    id: item_id,
                    content: Some(content),
                    selections: Default::default(),
                });
            }
            Err(err) if err.is_already_exists() => {
                debug!(item = %content.describe(), "item was added concurrently");
                report.already_present += 1;
                refetch = true;
            }
            Err(source) => {
                return Err(SyncError::ItemAdd { content_id, source });
            }
        }
    }

    if refetch {
        items = fetch_project_items(client, project_id).await?;
    }

    let fields = fetch_fields(client, project_id).await?;
    for item in &items {
        let Some(content) = &item.content else {
            continue;
        };
        let targets = [
            (STATUS_FIELD, derive_status(content)),
            (AREA_FIELD, derive_area(content.labels())),
            (PRIORITY_FIELD, derive_priority(content.labels())),
        ];
        for (field_name, option_name) in targets {
            let Some(option_name) = option_name else {
                continue;
            };
            match apply_value(client, project_id, item, &fields, field_name, option_name).await? {
                ValueChange::Set => report.values_set += 1,
                ValueChange::Unchanged => report.values_unchanged += 1,
                ValueChange::NotOnBoard => {}
            }
        }
    }

    info!(
        project_id,
        existing = report.existing,
        added = report.added,
        already_present = report.already_present,
        values_set = report.values_set,
        "backfill complete"
    );
    Ok(report)
}

enum ValueChange {
    Set,
    Unchanged,
    NotOnBoard,
}

/// Set `field_name` to `option_name` on `item` unless already selected
///
/// A board without the field or option is not an error.
async fn apply_value(
    client: &GraphqlClient,
    project_id: &str,
    item: &ProjectItem,
    fields: &[RemoteField],
    field_name: &str,
    option_name: &str,
) -> SyncResult<ValueChange> {
    let Some(field) = field_named(fields, field_name) else {
        debug!(field = field_name, "project has no such field");
        return Ok(ValueChange::NotOnBoard);
    };
    let Some(option) = field.option_named(option_name) else {
        debug!(field = field_name, option = option_name, "field has no such option");
        return Ok(ValueChange::NotOnBoard);
    };
    if item.selections.get(&field.id) == Some(&option.id) {
        return Ok(ValueChange::Unchanged);
    }

    if let Err(err) = set_single_select(client, project_id, &item.id, &field.id, &option.id).await {
        warn!(item_id = %item.id, field = field_name, error = %err, "failed to set field value");
        return Err(err);
    }
    Ok(ValueChange::Set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::mock::{graphql_error, MockTransport};
    use serde_json::Value;
    use std::sync::Arc;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn issue(state: IssueState, names: &[&str]) -> ItemContent {
        ItemContent::Issue(IssueContent {
            id: "I_1".to_string(),
            number: 1,
            state,
            labels: labels(names),
        })
    }

    fn pull(state: PullRequestState, merged: bool) -> ItemContent {
        ItemContent::PullRequest(PullRequestContent {
            id: "PR_1".to_string(),
            number: 2,
            state,
            merged,
            labels: vec![],
        })
    }

    #[test]
    fn test_status_table() {
        assert_eq!(derive_status(&pull(PullRequestState::Merged, true)), Some("Done"));
        assert_eq!(derive_status(&pull(PullRequestState::Open, true)), Some("Done"));
        assert_eq!(derive_status(&pull(PullRequestState::Closed, false)), Some("Done"));
        assert_eq!(derive_status(&pull(PullRequestState::Open, false)), Some("Review"));
        assert_eq!(derive_status(&issue(IssueState::Closed, &["blocked"])), Some("Done"));
        assert_eq!(derive_status(&issue(IssueState::Open, &["Blocked"])), Some("Blocked"));
        assert_eq!(derive_status(&issue(IssueState::Open, &[])), Some("Todo"));
        assert_eq!(derive_status(&ItemContent::Other), None);
    }

    #[test]
    fn test_area_first_label_wins() {
        assert_eq!(derive_area(&labels(&["area:backend", "area:frontend"])), Some("Backend"));
        assert_eq!(derive_area(&labels(&["bug", "Area:Infra"])), Some("Infrastructure"));
        assert_eq!(derive_area(&labels(&["area:mobile", "area:ai"])), Some("AI"));
        assert_eq!(derive_area(&labels(&["frontend"])), None);
        assert_eq!(derive_area(&[]), None);
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(derive_priority(&labels(&["priority:low", "priority:critical"])), Some("Low"));
        assert_eq!(derive_priority(&labels(&["PRIORITY:HIGH"])), Some("High"));
        assert_eq!(derive_priority(&labels(&["priority:urgent"])), None);
    }

    fn page(nodes: Vec<Value>) -> Value {
        json!({ "nodes": nodes, "pageInfo": { "hasNextPage": false, "endCursor": null } })
    }

    fn status_fields() -> Value {
        json!({ "node": { "fields": page(vec![
            json!({ "id": "F_title", "name": "Title", "dataType": "TITLE" }),
            json!({
                "id": "F_status",
                "name": "Status",
                "dataType": "SINGLE_SELECT",
                "options": [
                    { "id": "s_todo", "name": "Todo", "color": "GRAY", "description": "" },
                    { "id": "s_review", "name": "Review", "color": "BLUE", "description": "" },
                    { "id": "s_done", "name": "Done", "color": "GREEN", "description": "" }
                ]
            }),
            json!({
                "id": "F_priority",
                "name": "priority",
                "dataType": "SINGLE_SELECT",
                "options": [
                    { "id": "p_high", "name": "High", "color": "RED", "description": "" }
                ]
            })
        ])}})
    }

    fn repository_mock() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.on("ProjectItems", |_| {
            Ok(json!({ "node": { "items": page(vec![json!({
                "id": "PVTI_1",
                "content": {
                    "__typename": "Issue",
                    "id": "I_1",
                    "number": 1,
                    "state": "CLOSED",
                    "labels": { "nodes": [] }
                },
                "fieldValues": { "nodes": [{
                    "__typename": "ProjectV2ItemFieldSingleSelectValue",
                    "optionId": "s_done",
                    "field": { "id": "F_status" }
                }]}
            })])}}))
        });
        mock.on("RepositoryIssues", |vars| {
            assert_eq!(vars["owner"], "acme");
            assert_eq!(vars["name"], "platform");
            Ok(json!({ "repository": { "issues": page(vec![
                json!({ "id": "I_1", "number": 1, "state": "CLOSED", "labels": { "nodes": [] } }),
                json!({
                    "id": "I_2",
                    "number": 2,
                    "state": "OPEN",
                    "labels": { "nodes": [{ "name": "blocked" }, { "name": "priority:high" }] }
                })
            ])}}))
        });
        mock.on("RepositoryPullRequests", |_| {
            Ok(json!({ "repository": { "pullRequests": page(vec![
                json!({ "id": "PR_3", "number": 3, "state": "OPEN", "merged": false, "labels": { "nodes": [] } })
            ])}}))
        });
        mock.on("ProjectFields", |_| Ok(status_fields()));
        mock.on("SetItemFieldValue", |_| {
            Ok(json!({ "updateProjectV2ItemFieldValue": { "projectV2Item": { "id": "x" } } }))
        });
        mock
    }

    #[tokio::test]
    async fn test_backfill_adds_missing_and_sets_values() {
        let mock = repository_mock();
        mock.on("AddProjectItem", |vars| {
            let id = format!("PVTI_{}", vars["contentId"].as_str().unwrap());
            Ok(json!({ "addProjectV2ItemById": { "item": { "id": id } } }))
        });
        let client = GraphqlClient::new(mock.clone());

        let report = backfill_items(&client, "PVT_1", "acme", "platform").await.unwrap();

        assert_eq!(report.existing, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.already_present, 0);

        let added: Vec<Value> = mock
            .variables("AddProjectItem")
            .into_iter()
            .map(|v| v["contentId"].clone())
            .collect();
        assert_eq!(added, vec![json!("I_2"), json!("PR_3")]);

        // I_1 already Done; I_2 has no Blocked option but gets High; PR_3 goes to Review
        let sets: Vec<(String, String)> = mock
            .variables("SetItemFieldValue")
            .into_iter()
            .map(|v| {
                (
                    v["itemId"].as_str().unwrap().to_string(),
                    v["optionId"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            sets,
            vec![
                ("PVTI_I_2".to_string(), "p_high".to_string()),
                ("PVTI_PR_3".to_string(), "s_review".to_string()),
            ]
        );
        assert_eq!(report.values_set, 2);
        assert_eq!(report.values_unchanged, 1);
        assert_eq!(mock.count("ProjectItems"), 1);
    }

    #[tokio::test]
    async fn test_already_exists_rejection_triggers_one_refetch() {
        let mock = repository_mock();
        mock.on("AddProjectItem", |_| {
            Err(graphql_error("Content already exists in this project"))
        });
        let client = GraphqlClient::new(mock.clone());

        let report = backfill_items(&client, "PVT_1", "acme", "platform").await.unwrap();

        assert_eq!(report.added, 0);
        assert_eq!(report.already_present, 2);
        assert_eq!(mock.count("ProjectItems"), 2);
    }

    #[tokio::test]
    async fn test_other_add_rejections_are_fatal() {
        let mock = repository_mock();
        mock.on("AddProjectItem", |_| {
            Err(graphql_error("Resource not accessible by integration"))
        });
        let client = GraphqlClient::new(mock.clone());

        let err = backfill_items(&client, "PVT_1", "acme", "platform").await.unwrap_err();

        assert!(matches!(err, SyncError::ItemAdd { ref content_id, .. } if content_id == "I_2"));
        assert_eq!(mock.count("AddProjectItem"), 1);
        assert_eq!(mock.count("SetItemFieldValue"), 0);
    }
}
