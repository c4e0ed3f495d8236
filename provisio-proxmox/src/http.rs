//! reqwest-backed Proxmox VE API client.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::api::{api_error, parse_envelope, query_pairs, Method, ProxmoxApi};
use crate::error::{ProvisionError, Result};
use crate::settings::ConnectionSettings;

/// HTTP client for the versioned JSON API.
///
/// Authenticates every request with a static API token; there is no refresh
/// flow. Timeouts are left to the transport defaults.
pub struct HttpClient {
    base_url: String,
    auth_header: String,
    http_client: reqwest::Client,
}

impl HttpClient {
    /// Create a client for the given connection settings.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| ProvisionError::ConnectionFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url(),
            auth_header: settings.auth_header(),
            http_client,
        })
    }

    /// Root URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ProxmoxApi for HttpClient {
    #[instrument(skip(self, params), fields(method = %method, path = %path))]
    async fn request(&self, method: Method, path: &str, params: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let builder = match method {
            Method::Get => self.http_client.get(&url).query(&query_pairs(params.as_ref())),
            Method::Delete => self.http_client.delete(&url).query(&query_pairs(params.as_ref())),
            Method::Post => self.http_client.post(&url).json(&params.unwrap_or_else(|| json!({}))),
            Method::Put => self.http_client.put(&url).json(&params.unwrap_or_else(|| json!({}))),
        };

        let response = builder
            .header(AUTHORIZATION, &self.auth_header)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to reach hypervisor");
                ProvisionError::ConnectionFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProvisionError::ConnectionFailed(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!(status = %status, body = %body, "Hypervisor request failed");
            return Err(api_error(status.as_u16(), path, &body));
        }

        debug!(status = %status, "Hypervisor request succeeded");
        parse_envelope(path, &body)
    }
}
