//! Error types for project synchronization
//!
//! `TransportError` covers everything that can go wrong talking to the
//! GraphQL endpoint. `SyncError` is the taxonomy the reconcilers and entry
//! points propagate; callers decide per variant whether a failure is fatal
//! for a field, a project, or the whole process.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single entry of a GraphQL `errors[]` array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphqlErrorDetail {
    /// Human readable message
    pub message: String,
    /// Structured error type (`NOT_FOUND`, `FORBIDDEN`, ...) when GitHub sends one
    pub kind: Option<String>,
    /// Dotted response path the error applies to
    pub path: Option<String>,
}

impl std::fmt::Display for GraphqlErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.path) {
            (Some(kind), Some(path)) => write!(f, "[{}] {} (at {})", kind, self.message, path),
            (Some(kind), None) => write!(f, "[{}] {}", kind, self.message),
            (None, Some(path)) => write!(f, "{} (at {})", self.message, path),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

/// Failures of the GraphQL transport layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP exchange failed or returned a non-success status
    #[error("HTTP request failed{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Http {
        /// HTTP status code, when a response was received
        status: Option<u16>,
        /// Flattened error message including nested error entries
        message: String,
    },

    /// The response carried a GraphQL `errors[]` array
    #[error("GraphQL error: {}", join_details(.0))]
    Graphql(Vec<GraphqlErrorDetail>),

    /// The request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be decoded into the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

fn join_details(details: &[GraphqlErrorDetail]) -> String {
    if details.is_empty() {
        return "unknown GraphQL error".to_string();
    }
    details
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransportError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            // No status means the connection itself failed
            TransportError::Http { status: None, .. } => true,
            TransportError::Http {
                status: Some(status),
                message,
            } => {
                *status >= 500
                    || *status == 429
                    || (*status == 403 && message.to_lowercase().contains("rate limit"))
            }
            TransportError::Graphql(details) => details
                .iter()
                .any(|d| d.kind.as_deref() == Some("RATE_LIMITED")),
            TransportError::Decode(_) => false,
        }
    }

    /// Whether the server provably refused the request without running it
    ///
    /// Only these failures are safe to retry for mutations; a 5xx or timeout
    /// may arrive after the mutation was applied.
    pub fn is_rejected_before_execution(&self) -> bool {
        match self {
            TransportError::Http {
                status: Some(status),
                message,
            } => *status == 429 || (*status == 403 && message.to_lowercase().contains("rate limit")),
            TransportError::Graphql(details) => details
                .iter()
                .any(|d| d.kind.as_deref() == Some("RATE_LIMITED")),
            _ => false,
        }
    }

    /// Whether the server rejected a mutation because the target already exists
    ///
    /// Prefers a structured error type and falls back to the message text,
    /// which is the only signal `addProjectV2ItemById` currently gives.
    pub fn is_already_exists(&self) -> bool {
        let mentions_already = |text: &str| text.to_lowercase().contains("already");
        match self {
            TransportError::Graphql(details) => details.iter().any(|d| {
                matches!(d.kind.as_deref(), Some("ALREADY_EXISTS") | Some("CONFLICT"))
                    || mentions_already(&d.message)
            }),
            TransportError::Http { message, .. } => mentions_already(message),
            _ => false,
        }
    }

    /// Whether every GraphQL error is a NOT_FOUND entry
    pub fn is_not_found_only(&self) -> bool {
        match self {
            TransportError::Graphql(details) => {
                !details.is_empty()
                    && details
                        .iter()
                        .all(|d| d.kind.as_deref() == Some("NOT_FOUND"))
            }
            _ => false,
        }
    }
}

/// Errors produced while reconciling projects
#[derive(Debug, Error)]
pub enum SyncError {
    /// A project document is malformed or missing required values
    #[error("invalid project config {}: {message}", .path.display())]
    Config {
        /// File the document was read from
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// Runtime settings are missing or invalid
    #[error("invalid settings: {0}")]
    Settings(String),

    /// Neither an organization nor a user exists with this login
    #[error("owner '{0}' not found as organization or user")]
    OwnerNotFound(String),

    /// The requested project does not exist
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// The requested repository does not exist
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// A named project field does not exist
    #[error("field '{0}' not found in project")]
    FieldNotFound(String),

    /// A single-select field does not define the named option
    #[error("option '{option}' not found in field '{field}'")]
    OptionNotFound {
        /// Field that was searched
        field: String,
        /// Option that was requested
        option: String,
    },

    /// A single field could not be reconciled
    #[error("field '{field}' could not be synced: {message}")]
    FieldSync {
        /// Configured field name
        field: String,
        /// Failure description
        message: String,
    },

    /// Adding an issue or pull request to the project failed
    #[error("failed to add {content_id} to project: {source}")]
    ItemAdd {
        /// Node id of the issue or pull request
        content_id: String,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// The webhook event payload could not be used
    #[error("invalid event payload: {0}")]
    Event(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GraphQL transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Settings(err.to_string())
    }
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
