//! GitHub GraphQL plumbing
//!
//! Transport, typed client, retry policy, cursor pagination and the response
//! types shared by every reconciler.

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod pagination;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::GraphqlClient;
pub use pagination::paginate;
pub use retry::RetryStrategy;
pub use transport::{GraphqlRequest, GraphqlTransport, OctocrabTransport, RetryingTransport};
pub use types::{
    field_named, Connection, IssueContent, IssueState, ItemContent, Owner, OwnerKind, PageInfo,
    Project, ProjectItem, PullRequestContent, PullRequestState, RemoteField, RemoteOption,
    Repository,
};
