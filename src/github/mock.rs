//! In-memory transport for unit tests
//!
//! Routes requests by GraphQL operation name to registered handlers and
//! records every request so tests can assert on what was sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::transport::{GraphqlRequest, GraphqlTransport};
use crate::error::{GraphqlErrorDetail, TransportError};

type Handler = Box<dyn Fn(&Value) -> Result<Value, TransportError> + Send + Sync>;

/// Scriptable GraphQL transport
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    requests: Mutex<Vec<GraphqlRequest>>,
}

/// Render GraphQL error details the way GitHub puts them in an envelope
pub fn errors_json(details: &[GraphqlErrorDetail]) -> Value {
    Value::Array(
        details
            .iter()
            .map(|d| {
                let mut error = json!({ "message": d.message });
                if let Some(kind) = &d.kind {
                    error["type"] = json!(kind);
                }
                error
            })
            .collect(),
    )
}

/// A GraphQL error detail with only a message
pub fn graphql_error(message: &str) -> TransportError {
    TransportError::Graphql(vec![GraphqlErrorDetail {
        message: message.to_string(),
        kind: None,
        path: None,
    }])
}

impl MockTransport {
    /// Create a transport with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `operation` with `{ "data": handler(variables) }`
    ///
    /// A `TransportError::Graphql` from the handler becomes an `errors[]`
    /// envelope; any other error is returned as a transport failure.
    pub fn on<F>(&self, operation: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.on_envelope(operation, move |variables| match handler(variables) {
            Ok(data) => Ok(json!({ "data": data })),
            Err(TransportError::Graphql(details)) => {
                Ok(json!({ "data": null, "errors": errors_json(&details) }))
            }
            Err(other) => Err(other),
        });
    }

    /// Answer `operation` with a complete response envelope
    pub fn on_envelope<F>(&self, operation: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(operation.to_string(), Box::new(handler));
    }

    /// Fail the next request for `operation` before consulting its handler
    pub fn fail_next(&self, operation: &str, error: TransportError) {
        self.failures
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<GraphqlRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received for `operation`
    pub fn count(&self, operation: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation_name() == operation)
            .count()
    }

    /// Variables of every request received for `operation`, in order
    pub fn variables(&self, operation: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation_name() == operation)
            .map(|r| r.variables.clone())
            .collect()
    }

    /// Operation names of every mutation received, in order
    pub fn mutations(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_mutation())
            .map(|r| r.operation_name().to_string())
            .collect()
    }

    /// Forget recorded requests, keeping handlers
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl GraphqlTransport for MockTransport {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let operation = request.operation_name().to_string();

        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&operation) {
            Some(handler) => handler(&request.variables),
            None => Err(TransportError::Decode(format!(
                "no mock handler for operation {}",
                operation
            ))),
        }
    }
}
