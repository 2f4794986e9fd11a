//! Owner resolution

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{SyncError, SyncResult, TransportError};
use crate::github::{GraphqlClient, Owner, OwnerKind};

const OWNER_QUERY: &str = r#"query OwnerLookup($login: String!) {
  organization(login: $login) { id login }
  user(login: $login) { id login }
}"#;

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OwnerLookup {
    organization: Option<Account>,
    user: Option<Account>,
}

/// Resolve a login to an organization or user id
///
/// Both lookups run in a single aliased query; an organization wins when both
/// resolve.
///
/// # Errors
///
/// `SyncError::OwnerNotFound` when neither resolves.
pub async fn resolve_owner(client: &GraphqlClient, login: &str) -> SyncResult<Owner> {
    let lookup: OwnerLookup = client
        .query_allow_not_found(OWNER_QUERY, json!({ "login": login }))
        .await
        .or_else(|err| {
            // With both sides missing GitHub may return `data: null`
            if matches!(err, TransportError::Decode(ref m) if m.contains("no data")) {
                Ok(OwnerLookup {
                    organization: None,
                    user: None,
                })
            } else {
                Err(err)
            }
        })?;

    let owner = match (lookup.organization, lookup.user) {
        (Some(org), _) => Owner {
            id: org.id,
            kind: OwnerKind::Organization,
            login: login.to_string(),
        },
        (None, Some(user)) => Owner {
            id: user.id,
            kind: OwnerKind::User,
            login: login.to_string(),
        },
        (None, None) => return Err(SyncError::OwnerNotFound(login.to_string())),
    };

    debug!(login, kind = %owner.kind, id = %owner.id, "resolved owner");
    Ok(owner)
}
