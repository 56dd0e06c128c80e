// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::graphql::Body;

/// One outgoing request: a query document plus its variable values.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub body: Body,
    pub variables: BTreeMap<String, Value>,
}

/// `Transport` errors.
#[derive(thiserror::Error, Debug)]
#[error("transport request failed: {0}")]
pub struct TransportError(pub String);

/// Posts a query to the remote service and returns the parsed response
/// payload.
///
/// Implementations may be backed by HTTP, a local stub or a replay file.
/// Errors propagate to the update driver unchanged; the mirror does not
/// retry at this layer. Cancellation and timeouts are the implementation's
/// responsibility.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: QueryRequest) -> Result<Value, TransportError>;
}
