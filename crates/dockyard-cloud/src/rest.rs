//! HTTP implementation of [`CloudApi`] against the 1&1 Cloud Server API.

use crate::api::CloudApi;
use crate::error::{CloudError, Result};
use crate::types::{
    newest_matching, ApplianceQuery, FirewallPolicy, FirewallPolicyRequest, PowerAction, Server,
    ServerAppliance, ServerRequest,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Public API endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://cloudpanel-api.1and1.com/v1";

/// Timeout for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the access token.
const TOKEN_HEADER: &str = "X-TOKEN";

/// REST client for one provider account.
///
/// Build it once from the stored credentials and share it; it wraps a
/// pooled `reqwest::Client`.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl RestClient {
    /// Create a client for `endpoint` authenticating with `access_token`.
    ///
    /// # Errors
    /// Returns an error if the endpoint is not an http(s) URL or the
    /// underlying HTTP client cannot be built.
    pub fn new(endpoint: &str, access_token: &str) -> Result<Self> {
        let base_url = endpoint.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(CloudError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.to_string(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(TOKEN_HEADER, &self.access_token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header(TOKEN_HEADER, &self.access_token)
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.client
            .put(self.url(path))
            .header(TOKEN_HEADER, &self.access_token)
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.client
            .delete(self.url(path))
            .header(TOKEN_HEADER, &self.access_token)
    }

    /// Send a request and decode the JSON body.
    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        kind: &'static str,
        id: &str,
    ) -> Result<T> {
        let body = self.execute(request, kind, id).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!(kind, error = %e, body = %body, "Unexpected response body");
            CloudError::Decode(format!("{kind}: {e}"))
        })
    }

    /// Send a request, map error statuses, and return the raw body.
    async fn execute(&self, request: RequestBuilder, kind: &'static str, id: &str) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::debug!(kind, id, status = %status, body = %body, "Provider request failed");
            return Err(CloudError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }
}

/// Pull the `message` field out of a provider error body, falling back to
/// the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl CloudApi for RestClient {
    async fn find_newest_appliance(&self, query: &ApplianceQuery) -> Result<ServerAppliance> {
        let appliances: Vec<ServerAppliance> = self
            .fetch(self.get("/server_appliances"), "server appliance", "*")
            .await?;
        tracing::debug!(count = appliances.len(), "Fetched server appliances");

        newest_matching(&appliances, query)
            .cloned()
            .ok_or_else(|| CloudError::NoMatchingAppliance(query.to_string()))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.fetch(self.get("/servers"), "server", "*").await
    }

    async fn list_firewall_policies(&self) -> Result<Vec<FirewallPolicy>> {
        self.fetch(self.get("/firewall_policies"), "firewall policy", "*")
            .await
    }

    async fn create_firewall_policy(
        &self,
        request: &FirewallPolicyRequest,
    ) -> Result<FirewallPolicy> {
        tracing::debug!(name = %request.name, "Creating firewall policy");
        self.fetch(
            self.post("/firewall_policies").json(request),
            "firewall policy",
            &request.name,
        )
        .await
    }

    async fn get_firewall_policy(&self, id: &str) -> Result<FirewallPolicy> {
        self.fetch(
            self.get(&format!("/firewall_policies/{id}")),
            "firewall policy",
            id,
        )
        .await
    }

    async fn delete_firewall_policy(&self, id: &str) -> Result<()> {
        tracing::debug!(firewall_id = %id, "Deleting firewall policy");
        self.execute(
            self.delete(&format!("/firewall_policies/{id}")),
            "firewall policy",
            id,
        )
        .await
        .map(|_| ())
    }

    async fn create_server(&self, request: &ServerRequest) -> Result<Server> {
        tracing::debug!(name = %request.name, appliance_id = %request.appliance_id, "Creating server");
        self.fetch(self.post("/servers").json(request), "server", &request.name)
            .await
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        self.fetch(self.get(&format!("/servers/{id}")), "server", id)
            .await
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        tracing::debug!(server_id = %id, "Deleting server");
        self.execute(self.delete(&format!("/servers/{id}")), "server", id)
            .await
            .map(|_| ())
    }

    async fn server_action(&self, id: &str, action: PowerAction) -> Result<()> {
        tracing::debug!(server_id = %id, %action, "Requesting server power action");
        self.execute(
            self.put(&format!("/servers/{id}/status/action"))
                .json(&action.to_request()),
            "server",
            id,
        )
        .await
        .map(|_| ())
    }
}
