//! Hypervisor API abstraction.
//!
//! Everything the orchestrator does goes through [`ProxmoxApi`], a single
//! request method over the REST-style JSON endpoint. The production backend is
//! [`crate::HttpClient`]; tests use [`crate::MockApi`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{ProvisionError, Result};

/// HTTP verbs used against the hypervisor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read
    Get,
    /// Create / trigger an action
    Post,
    /// Update
    Put,
    /// Delete
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Core hypervisor API trait.
///
/// Implementations block (await) until the hypervisor acknowledges the request.
/// A task-creating call is complete once the task is accepted, not once the
/// guest has finished provisioning.
#[async_trait]
pub trait ProxmoxApi: Send + Sync {
    /// Issue a request and return the `data` member of the response envelope.
    ///
    /// Returns `Value::Null` when the envelope carries no `data` member.
    /// Non-success responses surface as [`ProvisionError::Api`].
    async fn request(&self, method: Method, path: &str, params: Option<Value>) -> Result<Value>;
}

#[async_trait]
impl<T: ProxmoxApi + ?Sized> ProxmoxApi for Arc<T> {
    async fn request(&self, method: Method, path: &str, params: Option<Value>) -> Result<Value> {
        (**self).request(method, path, params).await
    }
}

/// Decode a `data` payload into a typed value.
pub(crate) fn decode<T: DeserializeOwned>(path: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ProvisionError::UnexpectedResponse {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Serialize a typed request body for [`ProxmoxApi::request`].
pub(crate) fn encode<T: serde::Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| ProvisionError::Internal(format!("Failed to encode request: {}", e)))
}

/// Parse the `{"data": ...}` envelope of a successful response body.
pub(crate) fn parse_envelope(path: &str, body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    let json: Value = serde_json::from_str(body).map_err(|e| ProvisionError::UnexpectedResponse {
        path: path.to_string(),
        message: format!("invalid JSON: {}", e),
    })?;

    Ok(match json {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Build an API error from a failed response.
///
/// A structured `errors` member is preferred; otherwise the raw body is kept.
pub(crate) fn api_error(status: u16, path: &str, body: &str) -> ProvisionError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("errors").filter(|e| !e.is_null()).map(|e| e.to_string()))
        .unwrap_or_else(|| body.to_string());

    ProvisionError::Api {
        status,
        path: path.to_string(),
        body: detail,
    }
}

/// Flatten a JSON object into query-string pairs. Booleans become `1`/`0`.
pub(crate) fn query_pairs(params: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = params else {
        return Vec::new();
    };

    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
