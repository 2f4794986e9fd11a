//! Project documents
//!
//! Each `*.yml` / `*.yaml` file in the configs directory declares the desired
//! state of one project board:
//!
//! ```yaml
//! project:
//!   name: Platform Roadmap
//!   owner: acme            # optional, falls back to PROJECT_OWNER
//!   description: Quarterly platform work
//!   public: false
//! fields:
//!   - name: Priority
//!     type: single_select
//!     options:
//!       - { name: High, color: red, description: Do next }
//! views:
//!   - { name: Board, layout: board }
//! automation:
//!   - { if: "label:blocked", set: { Status: Blocked } }
//! ```
//!
//! Malformed documents are skipped with a warning; the remaining documents
//! still load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::settings::RepoRef;

/// Desired state of one project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    /// File the document was read from
    pub source_file: PathBuf,
    /// Owner login (organization or user)
    pub owner: String,
    /// Project title
    pub name: String,
    /// Short description; `None` leaves the remote value alone
    pub description: Option<String>,
    /// Visibility; `None` leaves the remote value alone
    pub public: Option<bool>,
    /// Repository to link and backfill; defaults to `GITHUB_REPOSITORY`
    pub repository: Option<RepoRef>,
    /// Custom fields
    pub fields: Vec<FieldConfig>,
    /// Requested views (advisory only)
    pub views: Vec<ViewConfig>,
    /// Requested automation rules (advisory only)
    pub automation: Vec<AutomationRule>,
}

/// Desired custom field
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldConfig {
    /// Field name
    pub name: String,
    /// Field type as written, e.g. `single_select`, `Single Select`, `number`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Options for single-select fields
    #[serde(default)]
    pub options: Vec<FieldOptionConfig>,
}

/// Desired single-select option
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldOptionConfig {
    /// Option name
    pub name: String,
    /// Color as written; normalized when the field is synced
    #[serde(default)]
    pub color: Option<String>,
    /// Option description
    #[serde(default)]
    pub description: Option<String>,
}

/// Requested project view
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewConfig {
    /// View name
    pub name: String,
    /// Any other keys (layout, filters, grouping, ...)
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_yaml::Value>,
}

/// Requested automation rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AutomationRule {
    /// Optional rule name
    #[serde(default)]
    pub name: Option<String>,
    /// Trigger condition
    #[serde(default, rename = "if")]
    pub condition: Option<serde_yaml::Value>,
    /// Field assignments
    #[serde(default)]
    pub set: Option<serde_yaml::Value>,
}

impl AutomationRule {
    /// One-line description used in advisories
    pub fn summary(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let condition = self
            .condition
            .as_ref()
            .map(compact_yaml)
            .unwrap_or_else(|| "always".to_string());
        match &self.set {
            Some(set) => format!("if {} then set {}", condition, compact_yaml(set)),
            None => format!("if {}", condition),
        }
    }
}

fn compact_yaml(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    project: Option<RawProject>,
    #[serde(default)]
    fields: Vec<FieldConfig>,
    #[serde(default)]
    views: Vec<ViewConfig>,
    #[serde(default)]
    automation: Vec<AutomationRule>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    public: Option<bool>,
    #[serde(default)]
    repository: Option<String>,
}

/// Outcome of loading a configs directory
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents that loaded and validated
    pub configs: Vec<ProjectConfig>,
    /// Documents that were skipped, with the reason
    pub skipped: Vec<SyncError>,
}

/// Parse and validate one project document
///
/// `default_owner` is used when the document has no `project.owner`.
pub fn parse_project_config(
    text: &str,
    source: &Path,
    default_owner: Option<&str>,
) -> SyncResult<ProjectConfig> {
    let invalid = |message: String| SyncError::Config {
        path: source.to_path_buf(),
        message,
    };

    let raw: Option<RawDocument> =
        serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;
    let raw = raw.ok_or_else(|| invalid("document is empty".to_string()))?;
    let project = raw
        .project
        .ok_or_else(|| invalid("missing `project` section".to_string()))?;

    let name = project
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("project.name is required".to_string()))?;

    let owner = project
        .owner
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .or_else(|| default_owner.map(str::to_string))
        .ok_or_else(|| {
            invalid(
                "project.owner is required when PROJECT_OWNER and GITHUB_REPOSITORY_OWNER are unset"
                    .to_string(),
            )
        })?;

    let repository = project
        .repository
        .filter(|r| !r.trim().is_empty())
        .map(|r| r.parse::<RepoRef>())
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    for (index, field) in raw.fields.iter().enumerate() {
        if field.name.trim().is_empty() {
            return Err(invalid(format!("fields[{}].name is required", index)));
        }
        if field.field_type.trim().is_empty() {
            return Err(invalid(format!("fields[{}].type is required", index)));
        }
    }

    Ok(ProjectConfig {
        source_file: source.to_path_buf(),
        owner,
        name,
        description: project.description,
        public: project.public,
        repository,
        fields: raw.fields,
        views: raw.views,
        automation: raw.automation,
    })
}

/// List project documents in `dir`, sorted by path
pub fn discover_config_files(dir: &Path) -> SyncResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SyncError::Config {
            path: dir.to_path_buf(),
            message: "configs directory does not exist".to_string(),
        });
    }

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for extension in ["yml", "yaml"] {
        let pattern = format!("{}/*.{}", base, extension);
        let entries = glob::glob(&pattern).map_err(|e| SyncError::Config {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        files.extend(entries.filter_map(Result::ok).filter(|p| p.is_file()));
    }
    files.sort();
    Ok(files)
}

/// Load every project document in `dir`
///
/// Unreadable or invalid documents are logged and collected in
/// [`LoadReport::skipped`]; only a missing directory is an error.
pub fn load_project_configs(dir: &Path, default_owner: Option<&str>) -> SyncResult<LoadReport> {
    let mut report = LoadReport::default();

    for path in discover_config_files(dir)? {
        let result = fs::read_to_string(&path)
            .map_err(|e| SyncError::Config {
                path: path.clone(),
                message: e.to_string(),
            })
            .and_then(|text| parse_project_config(&text, &path, default_owner));

        match result {
            Ok(config) => {
                debug!(file = %path.display(), project = %config.name, "loaded project config");
                report.configs.push(config);
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping project config");
                report.skipped.push(err);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
project:
  name: Platform Roadmap
  owner: acme
  description: Quarterly platform work
  public: true
  repository: acme/platform
fields:
  - name: Priority
    type: single_select
    options:
      - name: High
        color: red
        description: Do next
      - name: Low
  - name: Estimate
    type: number
views:
  - name: Board
    layout: board
automation:
  - if: "label:blocked"
    set:
      Status: Blocked
"#;

    #[test]
    fn test_parse_full_document() {
        let config = parse_project_config(FULL, Path::new("roadmap.yml"), None).unwrap();

        assert_eq!(config.name, "Platform Roadmap");
        assert_eq!(config.owner, "acme");
        assert_eq!(config.description.as_deref(), Some("Quarterly platform work"));
        assert_eq!(config.public, Some(true));
        assert_eq!(config.repository.as_ref().map(|r| r.to_string()).as_deref(), Some("acme/platform"));
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.fields[0].options[0].color.as_deref(), Some("red"));
        assert_eq!(config.fields[0].options[1].color, None);
        assert_eq!(config.fields[1].field_type, "number");
        assert_eq!(config.views[0].name, "Board");
        assert!(config.views[0].settings.contains_key("layout"));
        assert_eq!(
            config.automation[0].summary(),
            "if label:blocked then set {\"Status\":\"Blocked\"}"
        );
    }

    #[test]
    fn test_owner_falls_back_to_default() {
        let text = "project:\n  name: Board\n";
        let config = parse_project_config(text, Path::new("b.yml"), Some("octo-org")).unwrap();
        assert_eq!(config.owner, "octo-org");
        assert_eq!(config.description, None);
        assert_eq!(config.public, None);
        assert!(config.fields.is_empty());

        let err = parse_project_config(text, Path::new("b.yml"), None).unwrap_err();
        assert!(err.to_string().contains("project.owner is required"));
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let err =
            parse_project_config("project:\n  owner: acme\n", Path::new("x.yml"), None).unwrap_err();
        assert!(matches!(err, SyncError::Config { ref message, .. } if message == "project.name is required"));

        let err = parse_project_config("project:\n  name: \"  \"\n", Path::new("x.yml"), Some("a"))
            .unwrap_err();
        assert!(err.to_string().contains("project.name is required"));
    }

    #[test]
    fn test_field_without_type_is_rejected() {
        let text = "project:\n  name: B\n  owner: a\nfields:\n  - name: Size\n    type: \"\"\n";
        let err = parse_project_config(text, Path::new("x.yml"), None).unwrap_err();
        assert!(err.to_string().contains("fields[0].type is required"));
    }

    #[test]
    fn test_empty_and_malformed_documents() {
        assert!(parse_project_config("", Path::new("e.yml"), Some("a")).is_err());
        assert!(parse_project_config("project: [unclosed", Path::new("m.yml"), Some("a")).is_err());
        assert!(parse_project_config("fields: []\n", Path::new("n.yml"), Some("a")).is_err());
    }

    #[test]
    fn test_load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b-roadmap.yml"), FULL).unwrap();
        fs::write(dir.path().join("a-team.yaml"), "project:\n  name: Team Board\n").unwrap();
        fs::write(dir.path().join("broken.yml"), "project:\n  owner: acme\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not yaml at all").unwrap();

        let report = load_project_configs(dir.path(), Some("octo-org")).unwrap();

        let names: Vec<&str> = report.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Team Board", "Platform Roadmap"]);
        assert_eq!(report.configs[0].owner, "octo-org");
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].to_string().contains("broken.yml"));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = load_project_configs(Path::new("/definitely/not/here"), None);
        assert!(matches!(result, Err(SyncError::Config { .. })));
    }
}
