//! Custom field reconciliation
//!
//! Fields are matched to remote fields by case-insensitive name. Missing
//! fields are created, single-select option sets are replaced wholesale when
//! they differ, and a field whose type changed is left alone. Each field is
//! reconciled independently: one failing field never stops the others.

use std::fmt;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult, TransportError};
use crate::github::{field_named, paginate, Connection, GraphqlClient, RemoteField, RemoteOption};
use crate::manifest::{FieldConfig, FieldOptionConfig};

/// Colors GitHub accepts for single-select options
pub const PALETTE: [&str; 8] = [
    "GRAY", "BLUE", "GREEN", "YELLOW", "ORANGE", "RED", "PINK", "PURPLE",
];

const DEFAULT_COLOR: &str = "GRAY";

const FIELD_SELECTION: &str = r#"... on ProjectV2FieldCommon { id name dataType }
          ... on ProjectV2SingleSelectField { options { id name color description } }"#;

fn project_fields_query() -> String {
    format!(
        r#"query ProjectFields($projectId: ID!, $after: String) {{
  node(id: $projectId) {{
    ... on ProjectV2 {{
      fields(first: 50, after: $after) {{
        nodes {{
          {selection}
        }}
        pageInfo {{ hasNextPage endCursor }}
      }}
    }}
  }}
}}"#,
        selection = FIELD_SELECTION
    )
}

fn create_field_mutation() -> String {
    format!(
        r#"mutation CreateProjectField($input: CreateProjectV2FieldInput!) {{
  createProjectV2Field(input: $input) {{
    projectV2Field {{
      {selection}
    }}
  }}
}}"#,
        selection = FIELD_SELECTION
    )
}

fn update_field_mutation() -> String {
    format!(
        r#"mutation UpdateProjectField($input: UpdateProjectV2FieldInput!) {{
  updateProjectV2Field(input: $input) {{
    projectV2Field {{
      {selection}
    }}
  }}
}}"#,
        selection = FIELD_SELECTION
    )
}

#[derive(Debug, Deserialize)]
struct FieldsNode {
    fields: Connection<RemoteField>,
}

#[derive(Debug, Deserialize)]
struct ProjectFields {
    node: Option<FieldsNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldPayload {
    project_v2_field: RemoteField,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateField {
    create_project_v2_field: FieldPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateField {
    update_project_v2_field: FieldPayload,
}

/// Field types that can be created through the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// One option out of a fixed, colored set
    SingleSelect,
    /// Free text
    Text,
    /// Numeric value
    Number,
    /// Calendar date
    Date,
    /// Sprint-style iteration
    Iteration,
}

impl FieldType {
    /// GraphQL `ProjectV2CustomFieldType` / `dataType` value
    pub fn as_graphql(self) -> &'static str {
        match self {
            FieldType::SingleSelect => "SINGLE_SELECT",
            FieldType::Text => "TEXT",
            FieldType::Number => "NUMBER",
            FieldType::Date => "DATE",
            FieldType::Iteration => "ITERATION",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_graphql())
    }
}

/// Normalize a configured type name
///
/// Lowercases and folds `-` and spaces to `_`, so `Single Select`,
/// `single-select` and `SINGLE_SELECT` are all accepted. Returns `None` for
/// anything outside the supported set.
pub fn normalize_field_type(raw: &str) -> Option<FieldType> {
    let normalized: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();

    match normalized.as_str() {
        "single_select" => Some(FieldType::SingleSelect),
        "text" => Some(FieldType::Text),
        "number" => Some(FieldType::Number),
        "date" => Some(FieldType::Date),
        "iteration" => Some(FieldType::Iteration),
        _ => None,
    }
}

/// Normalize an option color to the palette
///
/// Unknown colors fall back to `GRAY` with a warning; a missing color is
/// `GRAY` silently.
pub fn normalize_color(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return DEFAULT_COLOR;
    };

    let upper = raw.to_uppercase();
    let canonical = match upper.as_str() {
        "GREY" => "GRAY",
        "INDIGO" => "PURPLE",
        other => other,
    };

    match PALETTE.iter().find(|c| **c == canonical) {
        Some(color) => *color,
        None => {
            warn!(color = raw, fallback = DEFAULT_COLOR, "unsupported option color");
            DEFAULT_COLOR
        }
    }
}

/// A single-select option ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredOption {
    /// Option label
    pub name: String,
    /// One of [`PALETTE`]
    pub color: &'static str,
    /// Option description, empty when not configured
    pub description: String,
}

impl DesiredOption {
    fn to_input(&self) -> Value {
        json!({
            "name": self.name,
            "color": self.color,
            "description": self.description,
        })
    }
}

/// Normalize configured options, dropping ones without a name
pub fn desired_options(options: &[FieldOptionConfig]) -> Vec<DesiredOption> {
    options
        .iter()
        .filter_map(|option| {
            let name = option.name.trim();
            if name.is_empty() {
                warn!("dropping single-select option without a name");
                return None;
            }
            Some(DesiredOption {
                name: name.to_string(),
                color: normalize_color(option.color.as_deref()),
                description: option.description.clone().unwrap_or_default(),
            })
        })
        .collect()
}

fn option_key(name: &str, color: &str) -> String {
    format!("{}::{}", name.to_lowercase(), color.to_uppercase())
}

/// Whether the remote options already match, ignoring order and name case
pub fn options_match(desired: &[DesiredOption], remote: &[RemoteOption]) -> bool {
    let mut wanted: Vec<String> = desired.iter().map(|o| option_key(&o.name, o.color)).collect();
    let mut current: Vec<String> = remote.iter().map(|o| option_key(&o.name, &o.color)).collect();
    wanted.sort();
    current.sort();
    wanted == current
}

/// Counts from one `sync_fields` run
#[derive(Debug, Default)]
pub struct FieldSyncReport {
    /// Fields created on the board
    pub created: usize,
    /// Fields renamed or given a new option set
    pub updated: usize,
    /// Fields that already matched
    pub unchanged: usize,
    /// Fields with an unsupported type
    pub skipped: usize,
    /// Fields that failed, with the reason
    pub failures: Vec<SyncError>,
}

impl FieldSyncReport {
    /// Number of fields that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

enum FieldAction {
    Created(RemoteField),
    Updated(RemoteField),
    Unchanged,
    Skipped,
}

/// Fetch every field of a project
pub async fn fetch_fields(client: &GraphqlClient, project_id: &str) -> SyncResult<Vec<RemoteField>> {
    let query = project_fields_query();
    let query = query.as_str();
    let fields = paginate(|after| async move {
        let page: ProjectFields = client
            .query(query, json!({ "projectId": project_id, "after": after }))
            .await?;
        page.node
            .map(|n| n.fields)
            .ok_or_else(|| TransportError::Decode(format!("project {} not found", project_id)))
    })
    .await?;
    Ok(fields)
}

/// Bring the project's custom fields in line with `desired`
///
/// Only a failure to list the remote fields is returned as an error; every
/// per-field problem lands in [`FieldSyncReport::failures`].
pub async fn sync_fields(
    client: &GraphqlClient,
    project_id: &str,
    desired: &[FieldConfig],
) -> SyncResult<FieldSyncReport> {
    let mut report = FieldSyncReport::default();
    if desired.is_empty() {
        return Ok(report);
    }

    let mut remote = fetch_fields(client, project_id).await?;
    debug!(project_id, count = remote.len(), "fetched project fields");

    for field in desired {
        match sync_field(client, project_id, field, &remote).await {
            Ok(FieldAction::Created(created)) => {
                report.created += 1;
                remote.push(created);
            }
            Ok(FieldAction::Updated(updated)) => {
                report.updated += 1;
                if let Some(slot) = remote.iter_mut().find(|f| f.id == updated.id) {
                    *slot = updated;
                }
            }
            Ok(FieldAction::Unchanged) => report.unchanged += 1,
            Ok(FieldAction::Skipped) => report.skipped += 1,
            Err(err) => {
                error!(field = %field.name, error = %err, "failed to sync field");
                report.failures.push(err);
            }
        }
    }

    info!(
        project_id,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        failed = report.failed(),
        "fields synced"
    );
    Ok(report)
}

async fn sync_field(
    client: &GraphqlClient,
    project_id: &str,
    field: &FieldConfig,
    remote: &[RemoteField],
) -> SyncResult<FieldAction> {
    let Some(field_type) = normalize_field_type(&field.field_type) else {
        warn!(field = %field.name, field_type = %field.field_type, "unsupported field type, skipping");
        return Ok(FieldAction::Skipped);
    };
    let field_failed = |message: String| SyncError::FieldSync {
        field: field.name.clone(),
        message,
    };

    let Some(existing) = field_named(remote, &field.name) else {
        let mut input = Map::new();
        input.insert("projectId".to_string(), json!(project_id));
        input.insert("dataType".to_string(), json!(field_type.as_graphql()));
        input.insert("name".to_string(), json!(field.name));
        if field_type == FieldType::SingleSelect {
            let options = desired_options(&field.options);
            if options.is_empty() {
                return Err(field_failed(
                    "single-select field needs at least one valid option".to_string(),
                ));
            }
            input.insert(
                "singleSelectOptions".to_string(),
                Value::Array(options.iter().map(DesiredOption::to_input).collect()),
            );
        }

        let created: CreateField = client
            .query(&create_field_mutation(), json!({ "input": Value::Object(input) }))
            .await
            .map_err(|e| field_failed(e.to_string()))?;
        info!(field = %field.name, field_type = %field_type, "created field");
        return Ok(FieldAction::Created(created.create_project_v2_field.project_v2_field));
    };

    if existing.data_type != field_type.as_graphql() {
        warn!(
            field = %field.name,
            remote_type = %existing.data_type,
            desired_type = %field_type,
            "field type differs from remote, leaving it unchanged"
        );
        return Ok(FieldAction::Skipped);
    }

    let rename = existing.name != field.name;
    let mut input = Map::new();
    input.insert("fieldId".to_string(), json!(existing.id));
    if rename {
        input.insert("name".to_string(), json!(field.name));
    }

    let mut replace_options = false;
    if field_type == FieldType::SingleSelect {
        let options = desired_options(&field.options);
        if !options.is_empty() && !options_match(&options, &existing.options) {
            replace_options = true;
            input.insert(
                "singleSelectOptions".to_string(),
                Value::Array(options.iter().map(DesiredOption::to_input).collect()),
            );
        }
    }

    if !rename && !replace_options {
        debug!(field = %field.name, "field up to date");
        return Ok(FieldAction::Unchanged);
    }

    let updated: UpdateField = client
        .query(&update_field_mutation(), json!({ "input": Value::Object(input) }))
        .await
        .map_err(|e| field_failed(e.to_string()))?;
    info!(field = %field.name, rename, replace_options, "updated field");
    Ok(FieldAction::Updated(updated.update_project_v2_field.project_v2_field))
}
