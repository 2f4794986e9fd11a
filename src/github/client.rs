//! Typed GraphQL client
//!
//! Wraps a transport, turns `errors[]` envelopes into `TransportError`s and
//! decodes `data` into the caller's response type.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::retry::RetryStrategy;
use super::transport::{
    envelope_errors, GraphqlRequest, GraphqlTransport, OctocrabTransport, RetryingTransport,
};
use crate::error::{SyncError, SyncResult, TransportError};
use crate::settings::Settings;

/// GraphQL client shared by every reconciler
#[derive(Clone)]
pub struct GraphqlClient {
    transport: Arc<dyn GraphqlTransport>,
}

impl GraphqlClient {
    /// Create a client over an existing transport
    pub fn new(transport: Arc<dyn GraphqlTransport>) -> Self {
        Self { transport }
    }

    /// Create the production client: octocrab, per-call timeout, retries
    pub fn from_settings(settings: &Settings) -> SyncResult<Self> {
        let token = settings.require_token()?;
        let octocrab =
            OctocrabTransport::new(token, settings.request_timeout(), settings.api_url())
                .map_err(SyncError::Transport)?;
        let strategy = match settings.max_retries {
            0 => RetryStrategy::none(),
            max_retries => RetryStrategy {
                max_retries,
                ..RetryStrategy::default()
            },
        };
        Ok(Self::new(Arc::new(RetryingTransport::new(
            Arc::new(octocrab),
            strategy,
        ))))
    }

    /// Run a query or mutation and decode its `data`
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, TransportError> {
        self.run(query, variables, false).await
    }

    /// Like [`query`](Self::query), but accept partial data when every error
    /// is `NOT_FOUND`
    ///
    /// Aliased lookups such as `organization(login)` + `user(login)` always
    /// report the side that does not exist.
    pub async fn query_allow_not_found<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, TransportError> {
        self.run(query, variables, true).await
    }

    async fn run<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        allow_not_found: bool,
    ) -> Result<T, TransportError> {
        let request = GraphqlRequest::new(query, variables);
        let mut envelope = self.transport.execute(&request).await?;

        let errors = envelope_errors(&envelope);
        if !errors.is_empty() {
            let error = TransportError::Graphql(errors);
            if !(allow_not_found && error.is_not_found_only()) {
                return Err(error);
            }
            debug!(operation = request.operation_name(), %error, "ignoring NOT_FOUND errors");
        }

        let data = envelope
            .get_mut("data")
            .map(Value::take)
            .filter(|d| !d.is_null())
            .ok_or_else(|| {
                TransportError::Decode(format!(
                    "{} response contained no data",
                    request.operation_name()
                ))
            })?;

        serde_json::from_value(data).map_err(|e| {
            TransportError::Decode(format!("{}: {}", request.operation_name(), e))
        })
    }
}
