//! Runtime settings
//!
//! Settings are read once at startup from an optional TOML file and the
//! process environment (environment wins), then passed explicitly to every
//! component. Keys are the lowercased environment variable names, so
//! `PROJECT_NUMBER=3` and `project_number = 3` in the file are equivalent.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// `owner/name` repository reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// Owning account login
    pub owner: String,
    /// Repository name
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(SyncError::Settings(format!(
                "GITHUB_REPOSITORY must look like owner/name, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn default_status_field() -> String {
    "Status".to_string()
}

fn default_status_option() -> String {
    "In Progress".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Settings shared by all entry points
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Token used to authenticate GraphQL requests
    #[serde(default)]
    pub github_token: Option<String>,
    /// Repository the workflow runs in, `owner/name`
    #[serde(default)]
    pub github_repository: Option<String>,
    /// Owner of the workflow repository
    #[serde(default)]
    pub github_repository_owner: Option<String>,
    /// Restrict `sync` to this project, or name the project for `backfill`
    #[serde(default)]
    pub project_name: Option<String>,
    /// Owner login used when a project document does not name one
    #[serde(default)]
    pub project_owner: Option<String>,
    /// Milestone title that triggers the status transition
    #[serde(default)]
    pub milestone_name: Option<String>,
    /// Project number targeted by the milestone updater
    #[serde(default)]
    pub project_number: Option<u64>,
    /// Name of the single-select field the milestone updater sets
    #[serde(default = "default_status_field")]
    pub status_field_name: String,
    /// Option the milestone updater selects
    #[serde(default = "default_status_option")]
    pub status_option_name: String,
    /// Enable debug logging
    #[serde(default)]
    pub debug_project_sync: bool,
    /// Path of the webhook event payload
    #[serde(default)]
    pub github_event_path: Option<PathBuf>,
    /// REST/GraphQL API root, set by Actions on GitHub Enterprise Server
    #[serde(default)]
    pub github_api_url: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs", rename = "project_sync_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures
    #[serde(default = "default_max_retries", rename = "project_sync_max_retries")]
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_token: None,
            github_repository: None,
            github_repository_owner: None,
            project_name: None,
            project_owner: None,
            milestone_name: None,
            project_number: None,
            status_field_name: default_status_field(),
            status_option_name: default_status_option(),
            debug_project_sync: false,
            github_event_path: None,
            github_api_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Settings {
    /// Load settings from the optional file and the process environment
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Settings` when the file is missing or a value
    /// cannot be parsed (e.g. a non-numeric `PROJECT_NUMBER`).
    pub fn load(settings_file: Option<&Path>) -> SyncResult<Self> {
        Self::build(settings_file, Environment::default())
    }

    /// Load settings from an explicit set of variables instead of the process
    /// environment
    pub fn from_vars<I, K, V>(vars: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(None, Environment::default().source(Some(map)))
    }

    fn build(settings_file: Option<&Path>, environment: Environment) -> SyncResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = settings_file {
            if !path.exists() {
                return Err(SyncError::Settings(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(environment.ignore_empty(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// The API token, or an error naming the missing variable
    pub fn require_token(&self) -> SyncResult<&str> {
        non_empty(&self.github_token)
            .ok_or_else(|| SyncError::Settings("GITHUB_TOKEN is required".to_string()))
    }

    /// The workflow repository, if configured
    pub fn repository(&self) -> SyncResult<Option<RepoRef>> {
        non_empty(&self.github_repository)
            .map(str::parse)
            .transpose()
    }

    /// Owner login to use when a project document does not name one
    ///
    /// `PROJECT_OWNER`, then `GITHUB_REPOSITORY_OWNER`, then the owner part of
    /// `GITHUB_REPOSITORY`.
    pub fn default_owner(&self) -> Option<String> {
        non_empty(&self.project_owner)
            .or_else(|| non_empty(&self.github_repository_owner))
            .map(str::to_string)
            .or_else(|| self.repository().ok().flatten().map(|r| r.owner))
    }

    /// `PROJECT_NAME`, if set
    pub fn project_name(&self) -> Option<&str> {
        non_empty(&self.project_name)
    }

    /// API root to send requests to, when not api.github.com
    pub fn api_url(&self) -> Option<&str> {
        non_empty(&self.github_api_url)
    }

    /// Timeout applied to each GraphQL request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
