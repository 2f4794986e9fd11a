//! Project lookup, creation, patching and repository linking

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult, TransportError};
use crate::github::{paginate, Connection, GraphqlClient, Owner, Project, Repository};
use crate::manifest::ProjectConfig;
use crate::settings::RepoRef;

const PROJECT_FIELDS: &str = "id number title shortDescription public url";

const PROJECTS_PAGE_SIZE: u32 = 20;

fn owner_projects_query() -> String {
    format!(
        r#"query OwnerProjects($ownerId: ID!, $query: String!, $after: String) {{
  node(id: $ownerId) {{
    ... on ProjectV2Owner {{
      projectsV2(first: {page}, after: $after, query: $query) {{
        nodes {{ {fields} }}
        pageInfo {{ hasNextPage endCursor }}
      }}
    }}
  }}
}}"#,
        page = PROJECTS_PAGE_SIZE,
        fields = PROJECT_FIELDS
    )
}

fn create_project_mutation() -> String {
    format!(
        r#"mutation CreateProject($input: CreateProjectV2Input!) {{
  createProjectV2(input: $input) {{ projectV2 {{ {fields} }} }}
}}"#,
        fields = PROJECT_FIELDS
    )
}

fn update_project_mutation() -> String {
    format!(
        r#"mutation UpdateProject($input: UpdateProjectV2Input!) {{
  updateProjectV2(input: $input) {{ projectV2 {{ {fields} }} }}
}}"#,
        fields = PROJECT_FIELDS
    )
}

fn project_by_number_query() -> String {
    format!(
        r#"query ProjectByNumber($login: String!, $number: Int!) {{
  user(login: $login) {{ projectV2(number: $number) {{ {fields} }} }}
  organization(login: $login) {{ projectV2(number: $number) {{ {fields} }} }}
}}"#,
        fields = PROJECT_FIELDS
    )
}

const PROJECT_REPOSITORIES_QUERY: &str = r#"query ProjectRepositories($projectId: ID!, $after: String) {
  node(id: $projectId) {
    ... on ProjectV2 {
      repositories(first: 50, after: $after) {
        nodes { id nameWithOwner }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

const LINK_REPOSITORY_MUTATION: &str = r#"mutation LinkRepository($input: LinkProjectV2ToRepositoryInput!) {
  linkProjectV2ToRepository(input: $input) { repository { id } }
}"#;

const REPOSITORY_QUERY: &str = r#"query RepositoryLookup($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) { id nameWithOwner }
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsNode {
    projects_v2: Connection<Project>,
}

#[derive(Debug, Deserialize)]
struct OwnerProjects {
    node: Option<ProjectsNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPayload {
    project_v2: Project,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProject {
    create_project_v2: ProjectPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProject {
    update_project_v2: ProjectPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectHolder {
    project_v2: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct ProjectByNumber {
    user: Option<ProjectHolder>,
    organization: Option<ProjectHolder>,
}

#[derive(Debug, Deserialize)]
struct RepositoriesNode {
    repositories: Connection<Repository>,
}

#[derive(Debug, Deserialize)]
struct ProjectRepositories {
    node: Option<RepositoriesNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryLookup {
    repository: Option<Repository>,
}

/// Attribute changes needed to bring a project in line with its config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    /// New title
    pub title: Option<String>,
    /// New short description
    pub short_description: Option<String>,
    /// New visibility
    pub public: Option<bool>,
}

impl ProjectPatch {
    /// Whether nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.short_description.is_none() && self.public.is_none()
    }

    /// Names of the attributes this patch changes
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.short_description.is_some() {
            fields.push("shortDescription");
        }
        if self.public.is_some() {
            fields.push("public");
        }
        fields
    }
}

/// Compute the minimal patch from `current` to `desired`
///
/// Attributes the config leaves unset are not managed and never patched.
pub fn diff_project(current: &Project, desired: &ProjectConfig) -> ProjectPatch {
    let mut patch = ProjectPatch::default();

    if current.title != desired.name {
        patch.title = Some(desired.name.clone());
    }
    if let Some(description) = &desired.description {
        if current.short_description.as_deref().unwrap_or("") != description {
            patch.short_description = Some(description.clone());
        }
    }
    if let Some(public) = desired.public {
        if current.public != public {
            patch.public = Some(public);
        }
    }

    patch
}

/// What `ensure_project` did
#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    /// The project after reconciliation
    pub project: Project,
    /// Whether the project was created
    pub created: bool,
    /// Attributes that were patched
    pub updated_fields: Vec<&'static str>,
    /// Whether the repository was newly linked
    pub linked: bool,
}

/// Find a project under `owner` whose title matches case-insensitively
///
/// The server-side `query` filter is a substring search, so every page is
/// checked for an exact match.
pub async fn find_project_by_title(
    client: &GraphqlClient,
    owner: &Owner,
    title: &str,
) -> SyncResult<Option<Project>> {
    let query = owner_projects_query();
    let query = query.as_str();
    let projects = paginate(|after| async move {
        let page: OwnerProjects = client
            .query(
                query,
                json!({ "ownerId": owner.id, "query": title, "after": after }),
            )
            .await?;
        page.node
            .map(|n| n.projects_v2)
            .ok_or_else(|| TransportError::Decode(format!("owner {} has no projects", owner.login)))
    })
    .await?;

    Ok(projects
        .into_iter()
        .find(|p| p.title.eq_ignore_ascii_case(title)))
}

/// Find a project by owner login and number, trying user then organization
pub async fn find_project_by_number(
    client: &GraphqlClient,
    login: &str,
    number: u64,
) -> SyncResult<Project> {
    let lookup: ProjectByNumber = client
        .query_allow_not_found(
            &project_by_number_query(),
            json!({ "login": login, "number": number }),
        )
        .await
        .or_else(|err| match err {
            TransportError::Decode(ref m) if m.contains("no data") => Ok(ProjectByNumber {
                user: None,
                organization: None,
            }),
            other => Err(other),
        })?;

    lookup
        .user
        .and_then(|h| h.project_v2)
        .or_else(|| lookup.organization.and_then(|h| h.project_v2))
        .ok_or_else(|| SyncError::ProjectNotFound(format!("{}#{}", login, number)))
}

/// Look up a repository by owner and name
pub async fn find_repository(client: &GraphqlClient, repo: &RepoRef) -> SyncResult<Repository> {
    let lookup: RepositoryLookup = client
        .query_allow_not_found(
            REPOSITORY_QUERY,
            json!({ "owner": repo.owner, "name": repo.name }),
        )
        .await
        .or_else(|err| match err {
            TransportError::Decode(ref m) if m.contains("no data") => {
                Ok(RepositoryLookup { repository: None })
            }
            other => Err(other),
        })?;
    lookup
        .repository
        .ok_or_else(|| SyncError::RepositoryNotFound(repo.to_string()))
}

async fn create_project(
    client: &GraphqlClient,
    owner: &Owner,
    title: &str,
    repository: Option<&Repository>,
) -> SyncResult<Project> {
    let mut input = Map::new();
    input.insert("ownerId".to_string(), json!(owner.id));
    input.insert("title".to_string(), json!(title));
    if let Some(repo) = repository {
        input.insert("repositoryId".to_string(), json!(repo.id));
    }

    let created: CreateProject = client
        .query(&create_project_mutation(), json!({ "input": Value::Object(input) }))
        .await?;
    Ok(created.create_project_v2.project_v2)
}

async fn update_project(
    client: &GraphqlClient,
    project_id: &str,
    patch: &ProjectPatch,
) -> SyncResult<Project> {
    let mut input = Map::new();
    input.insert("projectId".to_string(), json!(project_id));
    if let Some(title) = &patch.title {
        input.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &patch.short_description {
        input.insert("shortDescription".to_string(), json!(description));
    }
    if let Some(public) = patch.public {
        input.insert("public".to_string(), json!(public));
    }

    let updated: UpdateProject = client
        .query(&update_project_mutation(), json!({ "input": Value::Object(input) }))
        .await?;
    Ok(updated.update_project_v2.project_v2)
}

/// Link `repository` to the project unless it is already linked
///
/// Returns whether a link was created.
pub async fn link_repository(
    client: &GraphqlClient,
    project_id: &str,
    repository: &Repository,
) -> SyncResult<bool> {
    let linked = paginate(|after| async move {
        let page: ProjectRepositories = client
            .query(
                PROJECT_REPOSITORIES_QUERY,
                json!({ "projectId": project_id, "after": after }),
            )
            .await?;
        page.node
            .map(|n| n.repositories)
            .ok_or_else(|| TransportError::Decode(format!("project {} not found", project_id)))
    })
    .await?;

    if linked.iter().any(|r| r.id == repository.id) {
        debug!(repository = %repository.name_with_owner, "repository already linked");
        return Ok(false);
    }

    client
        .query::<Value>(
            LINK_REPOSITORY_MUTATION,
            json!({ "input": { "projectId": project_id, "repositoryId": repository.id } }),
        )
        .await?;
    info!(repository = %repository.name_with_owner, "linked repository to project");
    Ok(true)
}

/// Make sure a project matching `config` exists under `owner`
///
/// Creates the project when no title matches, patches only attributes that
/// differ, and links `repository` when it is not linked yet.
pub async fn ensure_project(
    client: &GraphqlClient,
    config: &ProjectConfig,
    owner: &Owner,
    repository: Option<&Repository>,
) -> SyncResult<ProjectOutcome> {
    let (mut project, created) = match find_project_by_title(client, owner, &config.name).await? {
        Some(existing) => {
            debug!(project = %existing.title, number = existing.number, "found existing project");
            (existing, false)
        }
        None => {
            let project = create_project(client, owner, &config.name, repository).await?;
            info!(project = %project.title, number = project.number, owner = %owner.login, "created project");
            (project, true)
        }
    };

    let patch = diff_project(&project, config);
    let updated_fields = patch.changed_fields();
    if !patch.is_empty() {
        project = update_project(client, &project.id, &patch).await?;
        info!(project = %project.title, fields = ?updated_fields, "updated project attributes");
    }

    let linked = match repository {
        Some(repo) => link_repository(client, &project.id, repo).await?,
        None => false,
    };

    Ok(ProjectOutcome {
        project,
        created,
        updated_fields,
        linked,
    })
}
