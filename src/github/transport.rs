//! GraphQL transport seam
//!
//! `GraphqlTransport` is the only place the crate touches the network.
//! `OctocrabTransport` performs one authenticated, time-limited request;
//! `RetryingTransport` wraps any transport with bounded backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::retry::RetryStrategy;
use crate::error::{GraphqlErrorDetail, TransportError};

/// A GraphQL request body
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    /// Query or mutation document
    pub query: String,
    /// Variables referenced by the document
    pub variables: Value,
}

impl GraphqlRequest {
    /// Create a request from a document and its variables
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }

    /// Name of the operation, e.g. `ProjectItems` for `query ProjectItems(...)`
    pub fn operation_name(&self) -> &str {
        let trimmed = self.query.trim_start();
        let rest = trimmed
            .strip_prefix("query")
            .or_else(|| trimmed.strip_prefix("mutation"))
            .unwrap_or(trimmed)
            .trim_start();
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        &rest[..end]
    }

    /// Whether the document is a mutation
    pub fn is_mutation(&self) -> bool {
        self.query.trim_start().starts_with("mutation")
    }
}

/// Sends GraphQL requests and returns the raw response envelope
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    /// Execute a request, returning `{ "data": ..., "errors": [...] }`
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value, TransportError>;
}

/// Extract the `errors[]` array of a response envelope
pub fn envelope_errors(envelope: &Value) -> Vec<GraphqlErrorDetail> {
    envelope
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| errors.iter().map(error_detail).collect())
        .unwrap_or_default()
}

fn error_detail(error: &Value) -> GraphqlErrorDetail {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let kind = error
        .get("type")
        .or_else(|| error.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let path = error.get("path").and_then(Value::as_array).map(|segments| {
        segments
            .iter()
            .map(|s| match s {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    });
    GraphqlErrorDetail {
        message,
        kind,
        path,
    }
}

/// Transport backed by an authenticated octocrab client
///
/// Responses are read raw so a non-success status always surfaces as
/// `TransportError::Http` with its code, whatever the body looks like.
pub struct OctocrabTransport {
    client: Octocrab,
    timeout: Duration,
}

impl OctocrabTransport {
    /// Build a transport authenticating with a personal access or Actions token
    ///
    /// `base_uri` points the client at a GitHub Enterprise Server API root.
    pub fn new(
        token: &str,
        timeout: Duration,
        base_uri: Option<&str>,
    ) -> Result<Self, TransportError> {
        // RetryingTransport owns the retry policy; octocrab's own layer would
        // re-send mutations on 5xx
        let mut builder = Octocrab::builder()
            .personal_token(token.to_string())
            .add_retry_config(RetryConfig::None);
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri).map_err(|e| TransportError::Http {
                status: None,
                message: format!("invalid GitHub API URL '{}': {}", uri, e),
            })?;
        }
        let client = builder.build().map_err(|e| TransportError::Http {
            status: None,
            message: format!("failed to create GitHub client: {}", e),
        })?;
        Ok(Self { client, timeout })
    }

    async fn send(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        let response = self
            .client
            ._post("/graphql", Some(request))
            .await
            .map_err(map_octocrab_error)?;
        let status = response.status();

        let body = match self.client.body_to_string(response).await {
            Ok(body) => body,
            Err(err) if status.is_success() => return Err(map_octocrab_error(err)),
            Err(_) => String::new(),
        };
        if !status.is_success() {
            return Err(http_error(status.as_u16(), status.canonical_reason(), &body));
        }
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GraphqlTransport for OctocrabTransport {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        debug!(operation = request.operation_name(), "sending GraphQL request");
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}

/// Build the error for a non-success response
///
/// JSON bodies contribute their `message` and any `errors[]` entries; HTML
/// error pages fall back to the status reason.
fn http_error(status: u16, reason: Option<&str>, body: &str) -> TransportError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let mut message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| reason.unwrap_or("unexpected status").to_string());
    let nested: Vec<String> = parsed
        .as_ref()
        .map(envelope_errors)
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect();
    if !nested.is_empty() {
        message = format!("{} ({})", message, nested.join("; "));
    }
    TransportError::Http {
        status: Some(status),
        message,
    }
}

fn map_octocrab_error(err: octocrab::Error) -> TransportError {
    match err {
        octocrab::Error::Serde { source, .. } => TransportError::Decode(source.to_string()),
        octocrab::Error::Json { source, .. } => TransportError::Decode(source.to_string()),
        // No response was received
        other => TransportError::Http {
            status: None,
            message: other.to_string(),
        },
    }
}

/// Retries transient failures of an inner transport
pub struct RetryingTransport {
    inner: Arc<dyn GraphqlTransport>,
    strategy: RetryStrategy,
}

impl RetryingTransport {
    /// Wrap `inner` with the given retry policy
    pub fn new(inner: Arc<dyn GraphqlTransport>, strategy: RetryStrategy) -> Self {
        Self { inner, strategy }
    }

    async fn attempt(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        let envelope = self.inner.execute(request).await?;
        let errors = envelope_errors(&envelope);
        // Rate limiting is reported inside a 200 response
        if errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
        {
            return Err(TransportError::Graphql(errors));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl GraphqlTransport for RetryingTransport {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        let mut attempt = 0;
        loop {
            match self.attempt(request).await {
                Ok(envelope) => return Ok(envelope),
                Err(err) if self.strategy.should_retry(attempt, &err, request.is_mutation()) => {
                    attempt += 1;
                    let delay = self.strategy.calculate_delay(attempt);
                    warn!(
                        operation = request.operation_name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient GraphQL failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
