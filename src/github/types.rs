//! Typed views of GitHub GraphQL responses
//!
//! Responses are decoded once at the client boundary into these structs, so
//! the reconcilers never walk untyped JSON.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Cursor information returned with every connection page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether another page exists after this one
    pub has_next_page: bool,
    /// Cursor to pass as `after` for the next page
    pub end_cursor: Option<String>,
}

/// One page of a GraphQL connection
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    /// Page nodes; GitHub returns `null` for entries the token cannot see
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
    /// Cursor state for this page
    #[serde(default)]
    pub page_info: PageInfo,
}

/// Kind of account that owns a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    /// A GitHub organization
    Organization,
    /// A personal account
    User,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::Organization => write!(f, "organization"),
            OwnerKind::User => write!(f, "user"),
        }
    }
}

/// A resolved project owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owner {
    /// Node id
    pub id: String,
    /// Organization or user
    pub kind: OwnerKind,
    /// Login the owner was resolved from
    pub login: String,
}

/// A Project v2 board
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Node id
    pub id: String,
    /// Per-owner project number
    pub number: u64,
    /// Project title
    pub title: String,
    /// Short description shown on the board
    #[serde(default)]
    pub short_description: Option<String>,
    /// Whether the project is publicly visible
    #[serde(default)]
    pub public: bool,
    /// Browser URL
    #[serde(default)]
    pub url: Option<String>,
}

/// A repository reference
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Node id
    pub id: String,
    /// `owner/name`
    pub name_with_owner: String,
}

/// A single-select option as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOption {
    /// Option id
    pub id: String,
    /// Display name
    pub name: String,
    /// Palette color (`GRAY`, `BLUE`, ...)
    #[serde(default)]
    pub color: String,
    /// Option description
    #[serde(default)]
    pub description: String,
}

/// A project field as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteField {
    /// Field id
    pub id: String,
    /// Field name
    pub name: String,
    /// GraphQL `ProjectV2FieldType` (`TEXT`, `SINGLE_SELECT`, `TITLE`, ...)
    pub data_type: String,
    /// Options; empty for anything but single-select fields
    #[serde(default)]
    pub options: Vec<RemoteOption>,
}

impl RemoteField {
    /// Find an option by case-insensitive name
    pub fn option_named(&self, name: &str) -> Option<&RemoteOption> {
        self.options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }
}

/// Find a field by case-insensitive name
pub fn field_named<'a>(fields: &'a [RemoteField], name: &str) -> Option<&'a RemoteField> {
    fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// State of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueState {
    /// Open issue
    Open,
    /// Closed issue
    Closed,
    /// A state this client does not know about
    #[serde(other)]
    Unknown,
}

/// State of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestState {
    /// Open pull request
    Open,
    /// Closed without merging
    Closed,
    /// Merged pull request
    Merged,
    /// A state this client does not know about
    #[serde(other)]
    Unknown,
}

/// An issue as seen from a project item or repository listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueContent {
    /// Node id
    pub id: String,
    /// Issue number
    pub number: u64,
    /// Open or closed
    pub state: IssueState,
    /// Label names
    #[serde(default, deserialize_with = "label_names")]
    pub labels: Vec<String>,
}

/// A pull request as seen from a project item or repository listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestContent {
    /// Node id
    pub id: String,
    /// Pull request number
    pub number: u64,
    /// Open, closed or merged
    pub state: PullRequestState,
    /// Whether the pull request was merged
    #[serde(default)]
    pub merged: bool,
    /// Label names
    #[serde(default, deserialize_with = "label_names")]
    pub labels: Vec<String>,
}

/// Content of a project item, discriminated by GraphQL `__typename`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum ItemContent {
    /// A repository issue
    Issue(IssueContent),
    /// A repository pull request
    PullRequest(PullRequestContent),
    /// Draft issues and anything else without repository metadata
    #[serde(other)]
    Other,
}

impl ItemContent {
    /// Node id of the underlying issue or pull request
    pub fn id(&self) -> Option<&str> {
        match self {
            ItemContent::Issue(issue) => Some(&issue.id),
            ItemContent::PullRequest(pr) => Some(&pr.id),
            ItemContent::Other => None,
        }
    }

    /// Label names of the underlying issue or pull request
    pub fn labels(&self) -> &[String] {
        match self {
            ItemContent::Issue(issue) => &issue.labels,
            ItemContent::PullRequest(pr) => &pr.labels,
            ItemContent::Other => &[],
        }
    }

    /// Short human description, e.g. `issue #12`
    pub fn describe(&self) -> String {
        match self {
            ItemContent::Issue(issue) => format!("issue #{}", issue.number),
            ItemContent::PullRequest(pr) => format!("pull request #{}", pr.number),
            ItemContent::Other => "draft item".to_string(),
        }
    }
}

/// An item on a project board
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItem {
    /// Project item id
    pub id: String,
    /// Underlying content; `None` when the token cannot read it
    #[serde(default)]
    pub content: Option<ItemContent>,
    /// Current single-select values keyed by field id
    #[serde(
        default,
        rename = "fieldValues",
        deserialize_with = "single_select_values"
    )]
    pub selections: HashMap<String, String>,
}

impl ProjectItem {
    /// Node id of the item's content, if it has repository content
    pub fn content_id(&self) -> Option<&str> {
        self.content.as_ref().and_then(ItemContent::id)
    }
}

fn label_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Label {
        name: String,
    }

    let labels = Option::<Connection<Label>>::deserialize(deserializer)?;
    Ok(labels
        .map(|c| c.nodes.into_iter().flatten().map(|l| l.name).collect())
        .unwrap_or_default())
}

fn single_select_values<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct FieldRef {
        id: Option<String>,
    }

    #[derive(Deserialize)]
    #[serde(tag = "__typename")]
    enum FieldValue {
        #[serde(rename = "ProjectV2ItemFieldSingleSelectValue", rename_all = "camelCase")]
        SingleSelect {
            option_id: Option<String>,
            field: Option<FieldRef>,
        },
        #[serde(other)]
        Other,
    }

    let values = Option::<Connection<FieldValue>>::deserialize(deserializer)?;
    let mut selections = HashMap::new();
    for value in values.into_iter().flat_map(|c| c.nodes).flatten() {
        if let FieldValue::SingleSelect {
            option_id: Some(option_id),
            field: Some(FieldRef { id: Some(field_id) }),
        } = value
        {
            selections.insert(field_id, option_id);
        }
    }
    Ok(selections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_content_discriminates_on_typename() {
        let issue: ItemContent = serde_json::from_value(json!({
            "__typename": "Issue",
            "id": "I_1",
            "number": 7,
            "state": "OPEN",
            "labels": { "nodes": [{ "name": "blocked" }, null] }
        }))
        .unwrap();
        assert_eq!(
            issue,
            ItemContent::Issue(IssueContent {
                id: "I_1".to_string(),
                number: 7,
                state: IssueState::Open,
                labels: vec!["blocked".to_string()],
            })
        );

        let pr: ItemContent = serde_json::from_value(json!({
            "__typename": "PullRequest",
            "id": "PR_1",
            "number": 8,
            "state": "MERGED",
            "merged": true
        }))
        .unwrap();
        assert!(matches!(pr, ItemContent::PullRequest(ref p) if p.merged && p.labels.is_empty()));
        assert_eq!(pr.id(), Some("PR_1"));

        let draft: ItemContent =
            serde_json::from_value(json!({ "__typename": "DraftIssue" })).unwrap();
        assert_eq!(draft, ItemContent::Other);
        assert_eq!(draft.id(), None);
    }

    #[test]
    fn test_project_item_collects_single_select_values() {
        let item: ProjectItem = serde_json::from_value(json!({
            "id": "PVTI_1",
            "content": null,
            "fieldValues": { "nodes": [
                { "__typename": "ProjectV2ItemFieldTextValue" },
                {
                    "__typename": "ProjectV2ItemFieldSingleSelectValue",
                    "optionId": "opt_done",
                    "field": { "id": "F_status" }
                }
            ]}
        }))
        .unwrap();

        assert_eq!(item.content_id(), None);
        assert_eq!(item.selections.get("F_status").map(String::as_str), Some("opt_done"));
        assert_eq!(item.selections.len(), 1);
    }

    #[test]
    fn test_unknown_states_do_not_fail_decoding() {
        let pr: PullRequestContent = serde_json::from_value(json!({
            "id": "PR_2",
            "number": 3,
            "state": "DRAFTED"
        }))
        .unwrap();
        assert_eq!(pr.state, PullRequestState::Unknown);
        assert!(!pr.merged);
    }

    #[test]
    fn test_field_and_option_lookup_is_case_insensitive() {
        let fields = vec![RemoteField {
            id: "F_1".to_string(),
            name: "Status".to_string(),
            data_type: "SINGLE_SELECT".to_string(),
            options: vec![RemoteOption {
                id: "o1".to_string(),
                name: "In Progress".to_string(),
                color: "YELLOW".to_string(),
                description: String::new(),
            }],
        }];

        let field = field_named(&fields, "status").unwrap();
        assert_eq!(field.option_named("in progress").map(|o| o.id.as_str()), Some("o1"));
        assert!(field.option_named("Done").is_none());
        assert!(field_named(&fields, "Priority").is_none());
    }
}
