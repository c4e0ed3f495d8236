//! Mock hypervisor API for testing and development.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::api::{Method, ProxmoxApi};
use crate::error::{ProvisionError, Result};

/// A request observed by [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub params: Option<Value>,
}

impl RecordedRequest {
    /// Fetch a parameter by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

enum MockReply {
    Data(Value),
    Fail { status: u16, body: String },
}

/// Mock hypervisor API.
///
/// Replies are scripted per `(method, path)`; unscripted requests answer with
/// `null` data. Every request is recorded in order. Useful for:
/// - Unit and integration testing
/// - Dry runs of provisioning flows without a hypervisor
pub struct MockApi {
    replies: RwLock<HashMap<(Method, String), MockReply>>,
    requests: RwLock<Vec<RecordedRequest>>,
}

impl MockApi {
    /// Create a new mock API.
    pub fn new() -> Self {
        info!("Creating mock hypervisor API");
        Self {
            replies: RwLock::new(HashMap::new()),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Answer `(method, path)` with the given `data` payload.
    pub fn reply(&self, method: Method, path: &str, data: Value) -> &Self {
        if let Ok(mut replies) = self.replies.write() {
            replies.insert((method, path.to_string()), MockReply::Data(data));
        }
        self
    }

    /// Fail `(method, path)` with the given status and raw body.
    pub fn fail(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        if let Ok(mut replies) = self.replies.write() {
            replies.insert(
                (method, path.to_string()),
                MockReply::Fail {
                    status,
                    body: body.to_string(),
                },
            );
        }
        self
    }

    /// All requests issued so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests issued with the given method.
    pub fn requests_with(&self, method: Method) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.method == method).collect()
    }

    /// `"METHOD path"` for every request, for order assertions.
    pub fn call_log(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxmoxApi for MockApi {
    async fn request(&self, method: Method, path: &str, params: Option<Value>) -> Result<Value> {
        debug!(method = %method, path = %path, "Mock request");

        self.requests
            .write()
            .map_err(|_| ProvisionError::Internal("Lock poisoned".to_string()))?
            .push(RecordedRequest {
                method,
                path: path.to_string(),
                params,
            });

        let replies = self
            .replies
            .read()
            .map_err(|_| ProvisionError::Internal("Lock poisoned".to_string()))?;

        match replies.get(&(method, path.to_string())) {
            Some(MockReply::Data(data)) => Ok(data.clone()),
            Some(MockReply::Fail { status, body }) => Err(crate::api::api_error(*status, path, body)),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_reply_and_recording() {
        let api = MockApi::new();
        api.reply(Method::Get, "/cluster/nextid", json!("100"));

        let data = api.request(Method::Get, "/cluster/nextid", None).await.unwrap();
        assert_eq!(data, json!("100"));

        let unscripted = api.request(Method::Get, "/pools", None).await.unwrap();
        assert_eq!(unscripted, Value::Null);

        assert_eq!(api.call_log(), vec!["GET /cluster/nextid", "GET /pools"]);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let api = MockApi::new();
        api.fail(Method::Post, "/nodes/pve1/qemu/100/status/stop", 500, "VM 100 not running");

        let err = api
            .request(Method::Post, "/nodes/pve1/qemu/100/status/stop", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Api { status: 500, .. }));
        assert_eq!(api.requests_with(Method::Post).len(), 1);
    }
}
